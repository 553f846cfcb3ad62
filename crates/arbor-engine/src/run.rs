//! Per-run state and the per-node execution protocol shared by the tree
//! and graph executors.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use arbor_core::config::{EngineConfig, DEFAULT_MAX_PARALLEL};
use arbor_core::error::ArborError;
use arbor_core::event::EventBus;
use arbor_core::traits::{ExecutionCallbacks, NodeContext, TreeNodeExecutor};
use arbor_core::types::{ExecutionEvent, ExecutionId, NodeId, TraversalStrategy, TreeNode};

/// Knobs for a single execution call.
#[derive(Clone)]
pub struct ExecutionOptions {
    /// Overrides the tree's default traversal.
    pub traversal: Option<TraversalStrategy>,
    /// Depth limit relative to the traversal or subtree root.
    pub max_depth: Option<usize>,
    pub continue_on_error: bool,
    /// Group width for graph runs.
    pub max_parallel: usize,
    /// Once cancelled, nodes not yet started are skipped.
    pub cancel: CancellationToken,
    pub event_bus: Option<Arc<EventBus>>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            traversal: None,
            max_depth: None,
            continue_on_error: false,
            max_parallel: DEFAULT_MAX_PARALLEL,
            cancel: CancellationToken::new(),
            event_bus: None,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            traversal: config.executor.default_traversal,
            max_depth: config.executor.max_depth,
            continue_on_error: config.executor.continue_on_error,
            max_parallel: config.scheduler.max_parallel,
            ..Self::default()
        }
    }

    pub fn with_traversal(mut self, strategy: TraversalStrategy) -> Self {
        self.traversal = Some(strategy);
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }
}

/// Terminal state of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Completed,
    Failed,
    Skipped,
}

/// What happened when a node was dispatched.
#[derive(Debug)]
pub enum NodeOutcome<R> {
    Completed(R),
    Failed(ArborError),
    Skipped,
}

impl<R> NodeOutcome<R> {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Outcome of an execution call.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult<R> {
    pub execution_id: ExecutionId,
    /// True iff no node failed. Skipped nodes do not count.
    pub success: bool,
    pub completed_nodes: Vec<NodeId>,
    pub failed_nodes: Vec<NodeId>,
    pub skipped_nodes: Vec<NodeId>,
    pub results: HashMap<NodeId, R>,
    /// Error message per failed node.
    pub errors: HashMap<NodeId, String>,
    pub duration_ms: u64,
    /// Order in which nodes were scheduled.
    pub traversal_order: Vec<NodeId>,
}

impl<R> ExecutionResult<R> {
    pub fn status_of(&self, node_id: &str) -> Option<NodeStatus> {
        let has = |list: &[NodeId]| list.iter().any(|n| n == node_id);
        if has(&self.completed_nodes) {
            Some(NodeStatus::Completed)
        } else if has(&self.failed_nodes) {
            Some(NodeStatus::Failed)
        } else if has(&self.skipped_nodes) {
            Some(NodeStatus::Skipped)
        } else {
            None
        }
    }
}

/// Mutable state of one execution run.
///
/// Owned by the driving loop; node executors only ever see a read-only
/// [`NodeContext`] built from it, and every mutation goes through
/// [`ExecutionContext::record`].
pub struct ExecutionContext<'a, P, R> {
    pub execution_id: ExecutionId,
    /// Tree placements by id. Empty for graph runs.
    pub node_map: HashMap<NodeId, TreeNode>,
    pub enhanced_nodes: &'a HashMap<NodeId, P>,
    pub completed: Vec<NodeId>,
    pub failed: Vec<NodeId>,
    pub skipped: Vec<NodeId>,
    pub results: HashMap<NodeId, R>,
    pub errors: HashMap<NodeId, String>,
    status: HashMap<NodeId, NodeStatus>,
    cancel: CancellationToken,
    event_bus: Option<Arc<EventBus>>,
    started: Instant,
}

impl<'a, P, R> ExecutionContext<'a, P, R> {
    pub fn new(
        node_map: HashMap<NodeId, TreeNode>,
        enhanced_nodes: &'a HashMap<NodeId, P>,
        options: &ExecutionOptions,
    ) -> Self {
        Self {
            execution_id: ExecutionId::new(),
            node_map,
            enhanced_nodes,
            completed: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            results: HashMap::new(),
            errors: HashMap::new(),
            status: HashMap::new(),
            cancel: options.cancel.clone(),
            event_bus: options.event_bus.clone(),
            started: Instant::now(),
        }
    }

    pub fn status(&self, node_id: &str) -> Option<NodeStatus> {
        self.status.get(node_id).copied()
    }

    /// Payload backing a node: looked up by the placement's `node_id` for
    /// tree runs, by the node id itself for graph runs.
    pub fn payload(&self, id: &str) -> Option<&'a P> {
        let key = self.node_map.get(id).map_or(id, |n| n.node_id.as_str());
        let nodes: &'a HashMap<NodeId, P> = self.enhanced_nodes;
        nodes.get(key)
    }

    pub fn event_bus(&self) -> Option<&EventBus> {
        self.event_bus.as_deref()
    }

    /// Read-only view for the executor of `node_id`.
    pub fn node_context<'c>(&'c self, node_id: &'c str) -> NodeContext<'c, R> {
        NodeContext {
            execution_id: &self.execution_id,
            node_id,
            placement: self.node_map.get(node_id),
            results: &self.results,
            cancel: &self.cancel,
        }
    }

    /// Apply a node outcome. Each node ends up in exactly one set.
    ///
    /// Returns `false` when the node was already settled and the outcome
    /// was dropped.
    pub fn record(&mut self, node_id: &str, outcome: NodeOutcome<R>) -> bool {
        if self.is_settled(node_id) {
            return false;
        }
        let id = node_id.to_string();
        let event = match outcome {
            NodeOutcome::Completed(result) => {
                self.results.insert(id.clone(), result);
                self.completed.push(id.clone());
                self.status.insert(id.clone(), NodeStatus::Completed);
                ExecutionEvent::NodeCompleted {
                    execution_id: self.execution_id.clone(),
                    node_id: id,
                }
            }
            NodeOutcome::Failed(e) => return self.record_failure(node_id, &e),
            NodeOutcome::Skipped => {
                self.skipped.push(id.clone());
                self.status.insert(id.clone(), NodeStatus::Skipped);
                ExecutionEvent::NodeSkipped {
                    execution_id: self.execution_id.clone(),
                    node_id: id,
                }
            }
        };
        self.publish(event);
        true
    }

    fn record_failure(&mut self, node_id: &str, error: &ArborError) -> bool {
        if self.is_settled(node_id) {
            return false;
        }
        let id = node_id.to_string();
        let message = error.to_string();
        self.errors.insert(id.clone(), message.clone());
        self.failed.push(id.clone());
        self.status.insert(id.clone(), NodeStatus::Failed);
        self.publish(ExecutionEvent::NodeFailed {
            execution_id: self.execution_id.clone(),
            node_id: id,
            error: message,
        });
        true
    }

    fn is_settled(&self, node_id: &str) -> bool {
        let settled = self.status.contains_key(node_id);
        if settled {
            warn!(node_id = %node_id, "Node already settled, ignoring outcome");
        }
        settled
    }

    /// Record an outcome, then notify `callbacks`.
    ///
    /// `on_node_complete` and `on_node_error` run only after the node's
    /// result or error is stored and its status set. Returns whether the
    /// node failed.
    pub async fn settle(
        &mut self,
        node_id: &str,
        outcome: NodeOutcome<R>,
        callbacks: &dyn ExecutionCallbacks<R>,
    ) -> bool {
        match outcome {
            NodeOutcome::Failed(e) => {
                if self.record_failure(node_id, &e) {
                    callbacks.on_node_error(node_id, &e).await;
                }
                true
            }
            NodeOutcome::Completed(result) => {
                if self.record(node_id, NodeOutcome::Completed(result)) {
                    if let Some(result) = self.results.get(node_id) {
                        callbacks.on_node_complete(node_id, result).await;
                    }
                }
                false
            }
            NodeOutcome::Skipped => {
                self.record(node_id, NodeOutcome::Skipped);
                false
            }
        }
    }

    /// Mark every not-yet-settled node in `ids` as skipped.
    pub fn skip_remaining<'i>(&mut self, ids: impl IntoIterator<Item = &'i NodeId>) {
        for id in ids {
            if self.status(id).is_none() {
                debug!(node_id = %id, "Skipping node after failure");
                self.record(id, NodeOutcome::Skipped);
            }
        }
    }

    pub fn publish(&self, event: ExecutionEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event);
        }
    }

    /// Publish a progress event and return the completed count.
    pub fn report_progress(&self, total: usize) -> usize {
        let completed = self.completed.len();
        self.publish(ExecutionEvent::Progress {
            execution_id: self.execution_id.clone(),
            completed,
            total,
        });
        completed
    }

    pub fn run_started(&self, total: usize) {
        info!(execution_id = %self.execution_id, total, "Execution started");
        self.publish(ExecutionEvent::RunStarted {
            execution_id: self.execution_id.clone(),
            total,
            at: Utc::now(),
        });
    }

    /// Close the run and build its result.
    pub fn finish(self, traversal_order: Vec<NodeId>) -> ExecutionResult<R> {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        let success = self.failed.is_empty();

        info!(
            execution_id = %self.execution_id,
            success,
            completed = self.completed.len(),
            failed = self.failed.len(),
            skipped = self.skipped.len(),
            elapsed_ms,
            "Execution finished"
        );
        self.publish(ExecutionEvent::RunFinished {
            execution_id: self.execution_id.clone(),
            success,
            elapsed_ms,
            at: Utc::now(),
        });

        ExecutionResult {
            execution_id: self.execution_id,
            success,
            completed_nodes: self.completed,
            failed_nodes: self.failed,
            skipped_nodes: self.skipped,
            results: self.results,
            errors: self.errors,
            duration_ms: elapsed_ms,
            traversal_order,
        }
    }
}

/// Start and execute one node. The caller settles the outcome with
/// [`ExecutionContext::settle`].
///
/// A missing payload or a cancelled run yields `Skipped` without invoking
/// any callback.
pub(crate) async fn run_node<P, R>(
    executor: &dyn TreeNodeExecutor<P, R>,
    callbacks: &dyn ExecutionCallbacks<R>,
    payload: Option<&P>,
    ctx: &NodeContext<'_, R>,
    event_bus: Option<&EventBus>,
) -> NodeOutcome<R> {
    let Some(payload) = payload else {
        warn!(node_id = %ctx.node_id, "No payload for node, skipping");
        return NodeOutcome::Skipped;
    };
    if ctx.is_cancelled() {
        debug!(node_id = %ctx.node_id, "Run cancelled, skipping node");
        return NodeOutcome::Skipped;
    }

    if let Some(bus) = event_bus {
        bus.publish(ExecutionEvent::NodeStarted {
            execution_id: ctx.execution_id.clone(),
            node_id: ctx.node_id.to_string(),
        });
    }
    callbacks.on_node_start(ctx.node_id).await;

    let node_start = Instant::now();
    match executor.execute(payload, ctx).await {
        Ok(result) => {
            debug!(
                node_id = %ctx.node_id,
                elapsed_ms = node_start.elapsed().as_millis() as u64,
                "Node completed"
            );
            NodeOutcome::Completed(result)
        }
        Err(e) => {
            error!(node_id = %ctx.node_id, error = %e, "Node failed");
            NodeOutcome::Failed(e)
        }
    }
}

/// Dispatch a batch together and merge the outcomes once all settle.
///
/// Executors in the batch see the results recorded before it started.
/// Returns whether any node failed.
pub(crate) async fn run_batch<P, R>(
    executor: &dyn TreeNodeExecutor<P, R>,
    callbacks: &dyn ExecutionCallbacks<R>,
    ctx: &mut ExecutionContext<'_, P, R>,
    batch: &[NodeId],
) -> bool {
    let outcomes: Vec<NodeOutcome<R>> = {
        let shared = &*ctx;
        let node_ctxs: Vec<_> = batch.iter().map(|id| shared.node_context(id)).collect();
        let futs = batch.iter().zip(&node_ctxs).map(|(id, node_ctx)| {
            run_node(
                executor,
                callbacks,
                shared.payload(id),
                node_ctx,
                shared.event_bus(),
            )
        });
        futures::future::join_all(futs).await
    };

    let mut any_failed = false;
    for (id, outcome) in batch.iter().zip(outcomes) {
        any_failed |= ctx.settle(id, outcome, callbacks).await;
    }
    any_failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use futures::future::BoxFuture;
    use tokio::sync::broadcast;

    use arbor_test_utils::ScriptedExecutor;

    /// On every completion or error, notes which node outcomes the bus had
    /// already carried.
    struct BusWitness {
        rx: Mutex<broadcast::Receiver<ExecutionEvent>>,
        settled: Mutex<Vec<String>>,
        log: Mutex<Vec<String>>,
    }

    impl BusWitness {
        fn new(rx: broadcast::Receiver<ExecutionEvent>) -> Self {
            Self {
                rx: Mutex::new(rx),
                settled: Mutex::new(Vec::new()),
                log: Mutex::new(Vec::new()),
            }
        }

        fn note(&self, kind: &str, node_id: &str) {
            let mut settled = self.settled.lock().unwrap();
            let mut rx = self.rx.lock().unwrap();
            while let Ok(event) = rx.try_recv() {
                if let ExecutionEvent::NodeCompleted { node_id, .. }
                | ExecutionEvent::NodeFailed { node_id, .. } = event
                {
                    settled.push(node_id);
                }
            }
            let seen = settled.iter().any(|n| n == node_id);
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{}:published={}", kind, node_id, seen));
        }
    }

    impl ExecutionCallbacks<String> for BusWitness {
        fn on_node_complete<'a>(&'a self, node_id: &'a str, result: &'a String) -> BoxFuture<'a, ()> {
            Box::pin(async move {
                assert_eq!(result, &format!("done:{}", node_id));
                self.note("complete", node_id);
            })
        }

        fn on_node_error<'a>(&'a self, node_id: &'a str, _error: &'a ArborError) -> BoxFuture<'a, ()> {
            Box::pin(async move { self.note("error", node_id) })
        }
    }

    #[tokio::test]
    async fn test_callbacks_run_after_outcome_is_recorded() {
        let bus = Arc::new(EventBus::default());
        let witness = BusWitness::new(bus.subscribe());
        let payloads: HashMap<NodeId, String> =
            ["a", "b"].iter().map(|s| (s.to_string(), s.to_string())).collect();
        let options = ExecutionOptions::default().with_event_bus(bus);
        let mut ctx: ExecutionContext<'_, String, String> =
            ExecutionContext::new(HashMap::new(), &payloads, &options);
        let executor = ScriptedExecutor::new().failing_on(&["b"]);

        let batch = vec!["a".to_string(), "b".to_string()];
        assert!(run_batch(&executor, &witness, &mut ctx, &batch).await);

        assert_eq!(
            *witness.log.lock().unwrap(),
            vec!["complete:a:published=true", "error:b:published=true"]
        );
        assert_eq!(ctx.status("a"), Some(NodeStatus::Completed));
        assert_eq!(ctx.status("b"), Some(NodeStatus::Failed));
    }

    #[tokio::test]
    async fn test_settle_ignores_a_second_outcome() {
        let bus = Arc::new(EventBus::default());
        let witness = BusWitness::new(bus.subscribe());
        let payloads: HashMap<NodeId, String> = HashMap::new();
        let options = ExecutionOptions::default().with_event_bus(bus);
        let mut ctx: ExecutionContext<'_, String, String> =
            ExecutionContext::new(HashMap::new(), &payloads, &options);

        assert!(!ctx.settle("a", NodeOutcome::Completed("done:a".into()), &witness).await);
        assert!(ctx.settle("a", NodeOutcome::Failed(ArborError::Cancelled), &witness).await);

        assert_eq!(*witness.log.lock().unwrap(), vec!["complete:a:published=true"]);
        assert!(ctx.errors.is_empty());
    }

    #[test]
    fn test_record_keeps_sets_disjoint() {
        let payloads: HashMap<NodeId, ()> = HashMap::new();
        let mut ctx: ExecutionContext<'_, (), u32> =
            ExecutionContext::new(HashMap::new(), &payloads, &ExecutionOptions::default());

        assert!(ctx.record("a", NodeOutcome::Completed(1)));
        assert!(!ctx.record("a", NodeOutcome::Failed(ArborError::Cancelled)));
        ctx.record("b", NodeOutcome::Failed(ArborError::node_failed("b", "bad")));
        ctx.skip_remaining(&["a".to_string(), "b".to_string(), "c".to_string()]);

        assert_eq!(ctx.completed, vec!["a"]);
        assert_eq!(ctx.failed, vec!["b"]);
        assert_eq!(ctx.skipped, vec!["c"]);
        assert_eq!(ctx.results.get("a"), Some(&1));

        let result = ctx.finish(vec![]);
        assert!(!result.success);
        assert_eq!(result.status_of("c"), Some(NodeStatus::Skipped));
        assert_eq!(result.errors["b"], "Node execution failed: b: bad");
    }

    #[test]
    fn test_options_from_config() {
        let config = EngineConfig::from_toml(
            "[executor]\ncontinue_on_error = true\nmax_depth = 3\n[scheduler]\nmax_parallel = 2\n",
        )
        .unwrap();
        let options = ExecutionOptions::from_config(&config);
        assert!(options.continue_on_error);
        assert_eq!(options.max_depth, Some(3));
        assert_eq!(options.max_parallel, 2);
        assert_eq!(options.traversal, None);
    }
}
