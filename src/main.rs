use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use arbor_core::config::EngineConfig;
use arbor_core::error::Result as ArborResult;
use arbor_core::event::EventBus;
use arbor_core::traits::{NodeContext, TreeNodeExecutor};
use arbor_core::types::{ExecutionEvent, GraphRepresentation, NodeId, TraversalStrategy, Tree};

use arbor_engine::graph;
use arbor_engine::tree;
use arbor_engine::{ExecutionOptions, GraphExecutor, TreeExecutor};

#[derive(Parser)]
#[command(name = "arbor", version, about = "Dependency-graph and tree execution engine")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "arbor.toml", env = "ARBOR_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze or run a dependency graph
    Graph {
        #[command(subcommand)]
        action: GraphAction,
    },
    /// Analyze or run a tree
    Tree {
        #[command(subcommand)]
        action: TreeAction,
    },
    /// Show the effective configuration
    Config,
}

#[derive(Subcommand)]
enum GraphAction {
    /// Check structure and report cycles and isolated nodes
    Validate { file: PathBuf },
    /// Topological order and levels
    Order { file: PathBuf },
    /// Levels split into bounded parallel groups
    Groups {
        file: PathBuf,
        #[arg(long)]
        max_parallel: Option<usize>,
    },
    /// Direct and transitive dependencies of one node
    Deps { file: PathBuf, node: String },
    /// Longest path weighted by the file's `durations`
    CriticalPath { file: PathBuf },
    /// Dry run with the echo executor, group by group
    Run {
        file: PathBuf,
        #[arg(long)]
        max_parallel: Option<usize>,
        #[arg(long)]
        continue_on_error: bool,
        /// Print execution events to stderr as JSON lines
        #[arg(long)]
        events: bool,
    },
}

#[derive(Subcommand)]
enum TreeAction {
    /// Check the structural invariants
    Validate { file: PathBuf },
    /// Visit order for a strategy
    Traverse {
        file: PathBuf,
        #[arg(long)]
        strategy: Option<TraversalStrategy>,
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Route between two nodes through their lowest common ancestor
    Path { file: PathBuf, from: String, to: String },
    /// Slice below one node
    Subtree {
        file: PathBuf,
        root: String,
        #[arg(long)]
        max_depth: Option<usize>,
    },
    /// Dry run with the echo executor
    Run {
        file: PathBuf,
        /// Run each level concurrently
        #[arg(long, conflicts_with_all = ["leaves", "subtree"])]
        by_level: bool,
        /// Run only leaf nodes
        #[arg(long, conflicts_with = "subtree")]
        leaves: bool,
        /// Run only the subtree below this node
        #[arg(long)]
        subtree: Option<String>,
        #[arg(long)]
        strategy: Option<TraversalStrategy>,
        #[arg(long)]
        max_depth: Option<usize>,
        #[arg(long)]
        continue_on_error: bool,
        /// Print execution events to stderr as JSON lines
        #[arg(long)]
        events: bool,
    },
}

/// On-disk graph: the representation plus optional per-node durations.
#[derive(Deserialize)]
struct GraphFile {
    #[serde(flatten)]
    graph: GraphRepresentation,
    #[serde(default)]
    durations: HashMap<NodeId, f64>,
}

/// Dry-run executor: every node answers with its own payload key.
struct EchoExecutor;

impl TreeNodeExecutor<String, String> for EchoExecutor {
    fn execute<'a>(
        &'a self,
        node: &'a String,
        ctx: &'a NodeContext<'a, String>,
    ) -> BoxFuture<'a, ArborResult<String>> {
        Box::pin(async move {
            debug!(node_id = %ctx.node_id, payload = %node, "Echo");
            Ok(node.clone())
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        EngineConfig::load(&cli.config)?
    } else {
        EngineConfig::default()
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if cli.config.exists() {
        info!(path = %cli.config.display(), "Loaded config");
    }

    match cli.command {
        Commands::Graph { action } => handle_graph(action, &config).await,
        Commands::Tree { action } => handle_tree(action, &config).await,
        Commands::Config => print_json(&config),
    }
}

async fn handle_graph(action: GraphAction, config: &EngineConfig) -> anyhow::Result<()> {
    match action {
        GraphAction::Validate { file } => print_json(&graph::validate_graph(&load_graph(&file)?.graph)),
        GraphAction::Order { file } => print_json(&graph::topological_sort(&load_graph(&file)?.graph)),
        GraphAction::Groups { file, max_parallel } => {
            let max_parallel = max_parallel.unwrap_or(config.scheduler.max_parallel);
            print_json(&graph::parallel_groups(&load_graph(&file)?.graph, max_parallel))
        }
        GraphAction::Deps { file, node } => {
            print_json(&graph::analyze_dependencies(&load_graph(&file)?.graph, &node)?)
        }
        GraphAction::CriticalPath { file } => {
            let input = load_graph(&file)?;
            print_json(&graph::critical_path_analysis(&input.graph, &input.durations))
        }
        GraphAction::Run {
            file,
            max_parallel,
            continue_on_error,
            events,
        } => {
            let input = load_graph(&file)?;
            let mut options = ExecutionOptions::from_config(config);
            if let Some(max_parallel) = max_parallel {
                options = options.with_max_parallel(max_parallel);
            }
            if continue_on_error {
                options = options.with_continue_on_error(true);
            }
            let (options, forwarder) = prepare_run(options, events, input.graph.node_ids.len());

            let payloads: HashMap<NodeId, String> = input
                .graph
                .node_ids
                .iter()
                .map(|id| (id.clone(), id.clone()))
                .collect();
            let executor = GraphExecutor::<String, String>::new(Arc::new(EchoExecutor));
            let result = executor.execute(&input.graph, &payloads, &options).await;
            close_events(options, forwarder).await?;
            print_json(&result?)
        }
    }
}

async fn handle_tree(action: TreeAction, config: &EngineConfig) -> anyhow::Result<()> {
    match action {
        TreeAction::Validate { file } => print_json(&tree::validate_tree(&load_tree(&file)?)),
        TreeAction::Traverse {
            file,
            strategy,
            max_depth,
        } => {
            let t = load_tree(&file)?;
            let node_map = t.node_map();
            let root = node_map
                .get(&t.root_id)
                .with_context(|| format!("root node '{}' not found", t.root_id))?;
            let strategy = strategy
                .or(config.executor.default_traversal)
                .unwrap_or(t.default_traversal);
            let max_depth = max_depth.or(config.executor.max_depth);
            print_json(&tree::traverse(root, &node_map, strategy, max_depth).visit_order)
        }
        TreeAction::Path { file, from, to } => {
            let t = load_tree(&file)?;
            let path = tree::find_path(&t.node_map(), &from, &to)
                .with_context(|| format!("no path between '{}' and '{}'", from, to))?;
            print_json(&path)
        }
        TreeAction::Subtree {
            file,
            root,
            max_depth,
        } => {
            let t = load_tree(&file)?;
            let subtree = tree::get_subtree(&t.node_map(), &root, max_depth)
                .with_context(|| format!("node '{}' not found", root))?;
            print_json(&subtree)
        }
        TreeAction::Run {
            file,
            by_level,
            leaves,
            subtree,
            strategy,
            max_depth,
            continue_on_error,
            events,
        } => {
            let t = load_tree(&file)?;
            let mut options = ExecutionOptions::from_config(config);
            if let Some(strategy) = strategy {
                options = options.with_traversal(strategy);
            }
            if let Some(max_depth) = max_depth {
                options = options.with_max_depth(max_depth);
            }
            if continue_on_error {
                options = options.with_continue_on_error(true);
            }
            let (options, forwarder) = prepare_run(options, events, t.nodes.len());

            let payloads: HashMap<NodeId, String> = t
                .nodes
                .iter()
                .map(|n| (n.node_id.clone(), n.node_id.clone()))
                .collect();
            let executor = TreeExecutor::<String, String>::new(Arc::new(EchoExecutor));
            let result = if by_level {
                executor.execute_by_level(&t, &payloads, &options).await
            } else if leaves {
                executor.execute_leaves(&t, &payloads, &options).await
            } else if let Some(root) = subtree {
                executor.execute_subtree(&t, &root, &payloads, &options).await
            } else {
                executor.execute(&t, &payloads, &options).await
            };
            close_events(options, forwarder).await?;
            print_json(&result?)
        }
    }
}

type EventForwarder = JoinHandle<anyhow::Result<std::io::Stderr>>;

/// Wire Ctrl-C to the run's cancellation token and optionally stream events
/// to stderr.
///
/// The bus holds every event a run over `nodes` nodes can publish.
fn prepare_run(
    options: ExecutionOptions,
    events: bool,
    nodes: usize,
) -> (ExecutionOptions, Option<EventForwarder>) {
    let cancel = options.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling run");
            cancel.cancel();
        }
    });

    if !events {
        return (options, None);
    }
    let bus = Arc::new(EventBus::new(event_capacity(nodes)));
    let forwarder = tokio::spawn(forward_events(bus.subscribe(), std::io::stderr()));
    (options.with_event_bus(bus), Some(forwarder))
}

/// Run start and finish plus start, outcome and progress per node.
fn event_capacity(nodes: usize) -> usize {
    nodes.saturating_mul(3).saturating_add(2)
}

/// Write each event as a JSON line until every sender is gone.
async fn forward_events<W: Write>(
    mut rx: broadcast::Receiver<ExecutionEvent>,
    mut out: W,
) -> anyhow::Result<W> {
    loop {
        match rx.recv().await {
            Ok(event) => writeln!(out, "{}", serde_json::to_string(&event)?)?,
            Err(RecvError::Lagged(missed)) => warn!(missed, "Event stream lagged"),
            Err(RecvError::Closed) => break,
        }
    }
    out.flush()?;
    Ok(out)
}

/// Drop the run's bus and wait for the forwarder to write what is left.
async fn close_events(
    options: ExecutionOptions,
    forwarder: Option<EventForwarder>,
) -> anyhow::Result<()> {
    drop(options);
    if let Some(forwarder) = forwarder {
        forwarder.await??;
    }
    Ok(())
}

fn load_graph(path: &Path) -> anyhow::Result<GraphFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read graph file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("failed to parse graph file {}", path.display()))
}

fn load_tree(path: &Path) -> anyhow::Result<Tree> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read tree file {}", path.display()))?;
    let mut tree: Tree = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse tree file {}", path.display()))?;
    tree.stats = tree.compute_stats();
    Ok(tree)
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::types::ExecutionId;
    use arbor_test_utils::{payloads, TreeBuilder};

    fn wide_tree(children: usize) -> Tree {
        (0..children)
            .fold(TreeBuilder::new("root"), |b, i| b.child("root", &format!("n{}", i)))
            .build("wide")
    }

    fn parse(out: Vec<u8>) -> Vec<ExecutionEvent> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    async fn run_with_bus(tree: &Tree, bus: EventBus) -> (ExecutionId, Vec<ExecutionEvent>) {
        let bus = Arc::new(bus);
        let forwarder = tokio::spawn(forward_events(bus.subscribe(), Vec::new()));
        let options = ExecutionOptions::default().with_event_bus(bus);

        let executor = TreeExecutor::<String, String>::new(Arc::new(EchoExecutor));
        let result = executor.execute(tree, &payloads(tree), &options).await.unwrap();
        assert!(result.success);

        drop(options);
        let out = forwarder.await.unwrap().unwrap();
        (result.execution_id, parse(out))
    }

    #[tokio::test]
    async fn test_sized_bus_forwards_every_event() {
        let tree = wide_tree(400);
        let (execution_id, events) =
            run_with_bus(&tree, EventBus::new(event_capacity(tree.nodes.len()))).await;

        assert_eq!(events.len(), event_capacity(401));
        assert!(matches!(events.first(), Some(ExecutionEvent::RunStarted { total: 401, .. })));
        assert!(matches!(events.last(), Some(ExecutionEvent::RunFinished { success: true, .. })));
        assert!(events.iter().all(|e| e.execution_id() == &execution_id));
        let completed = events
            .iter()
            .filter(|e| matches!(e, ExecutionEvent::NodeCompleted { .. }))
            .count();
        assert_eq!(completed, 401);
    }

    #[tokio::test]
    async fn test_lagging_stream_keeps_going_until_run_finished() {
        let tree = wide_tree(400);
        let (_, events) = run_with_bus(&tree, EventBus::new(4)).await;

        assert!(!events.is_empty());
        assert!(events.len() < event_capacity(401));
        assert!(matches!(events.last(), Some(ExecutionEvent::RunFinished { success: true, .. })));
    }

    #[tokio::test]
    async fn test_close_events_waits_for_forwarder() {
        let (options, forwarder) = prepare_run(ExecutionOptions::default(), true, 1);
        assert!(forwarder.is_some());
        if let Some(bus) = options.event_bus.as_deref() {
            bus.publish(ExecutionEvent::Progress {
                execution_id: ExecutionId::new(),
                completed: 0,
                total: 1,
            });
        }
        close_events(options, forwarder).await.unwrap();
    }
}
