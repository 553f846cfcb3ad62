//! Mock executors, recording callbacks, and fixtures shared by Arbor tests.

use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures::future::BoxFuture;

use arbor_core::error::{ArborError, Result};
use arbor_core::traits::{ExecutionCallbacks, NodeContext, TreeNodeExecutor};
use arbor_core::types::{Edge, GraphRepresentation, NodeId, Tree, TreeNode, TreeNodeType};

/// Node executor that answers `"done:<payload>"` and fails on chosen node ids.
///
/// Records the order in which nodes were started and the peak number of
/// nodes in flight at once.
#[derive(Default)]
pub struct ScriptedExecutor {
    fail_on: HashSet<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<NodeId>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every node whose id is in `ids`.
    pub fn failing_on(mut self, ids: &[&str]) -> Self {
        self.fail_on = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Sleep this long inside every node.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Node ids in the order they were started.
    pub fn calls(&self) -> Vec<NodeId> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of nodes that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl<P> TreeNodeExecutor<P, String> for ScriptedExecutor
where
    P: Display + Send + Sync,
{
    fn execute<'a>(
        &'a self,
        node: &'a P,
        ctx: &'a NodeContext<'a, String>,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(ctx.node_id.to_string());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.fail_on.contains(ctx.node_id) {
                return Err(ArborError::node_failed(ctx.node_id, "scripted failure"));
            }
            Ok(format!("done:{}", node))
        })
    }
}

/// Callbacks that log every invocation as a string, e.g. `"start:a"`,
/// `"complete:a"`, `"error:a"`, `"progress:1/3"`.
#[derive(Default)]
pub struct RecordingCallbacks {
    log: Mutex<Vec<String>>,
}

impl RecordingCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Entries starting with `prefix`, e.g. `"progress:"`.
    pub fn entries(&self, prefix: &str) -> Vec<String> {
        self.log()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    fn push(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl<R: Sync> ExecutionCallbacks<R> for RecordingCallbacks {
    fn on_node_start<'a>(&'a self, node_id: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.push(format!("start:{}", node_id)) })
    }

    fn on_node_complete<'a>(&'a self, node_id: &'a str, _result: &'a R) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.push(format!("complete:{}", node_id)) })
    }

    fn on_node_error<'a>(&'a self, node_id: &'a str, _error: &'a ArborError) -> BoxFuture<'a, ()> {
        Box::pin(async move { self.push(format!("error:{}", node_id)) })
    }

    fn on_progress(&self, completed: usize, total: usize) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.push(format!("progress:{}/{}", completed, total)) })
    }
}

/// Builds well-formed trees where each placement's payload key equals its id.
pub struct TreeBuilder {
    root_id: NodeId,
    nodes: Vec<TreeNode>,
}

impl TreeBuilder {
    pub fn new(root_id: &str) -> Self {
        Self {
            root_id: root_id.to_string(),
            nodes: vec![TreeNode::root(root_id, root_id)],
        }
    }

    /// Attach `id` under `parent`, linking both sides.
    ///
    /// Panics if `parent` has not been added yet.
    pub fn child(mut self, parent: &str, id: &str) -> Self {
        let parent_idx = self
            .nodes
            .iter()
            .position(|n| n.id == parent)
            .unwrap_or_else(|| panic!("unknown parent '{}'", parent));
        let node = TreeNode::child_of(&self.nodes[parent_idx], id, id);

        let parent_node = &mut self.nodes[parent_idx];
        parent_node.child_ids.push(id.to_string());
        if parent_node.node_type == TreeNodeType::Leaf {
            parent_node.node_type = TreeNodeType::Branch;
        }
        self.nodes.push(node);
        self
    }

    pub fn build(self, tree_id: &str) -> Tree {
        Tree::new(tree_id, self.root_id, self.nodes)
    }
}

/// Payload map with one `node_id -> node_id` entry per placement.
pub fn payloads(tree: &Tree) -> HashMap<NodeId, String> {
    tree.nodes
        .iter()
        .map(|n| (n.node_id.clone(), n.node_id.clone()))
        .collect()
}

/// Graph from node ids and active `(source, target)` edges.
pub fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> GraphRepresentation {
    GraphRepresentation::new(
        nodes.iter().map(|s| s.to_string()).collect(),
        edges.iter().map(|(s, t)| Edge::new(*s, *t)).collect(),
    )
}
