use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use arbor_core::error::{ArborError, Result};
use arbor_core::traits::{ExecutionCallbacks, NoopCallbacks, TreeNodeExecutor};
use arbor_core::types::{GraphRepresentation, NodeId};

use super::cycle::detect_cycles;
use super::parallel::parallel_groups;
use crate::run::{run_batch, ExecutionContext, ExecutionOptions, ExecutionResult};

/// Outcome of a graph run.
#[derive(Debug, Clone, Serialize)]
pub struct GraphExecutionResult<R> {
    /// The dispatch groups, in order.
    pub groups: Vec<Vec<NodeId>>,
    /// Per-node outcome; `traversal_order` is the flattened groups.
    pub result: ExecutionResult<R>,
}

/// Runs a DAG group by group.
///
/// Groups come from [`parallel_groups`], so a node never starts before all
/// of its dependencies settled, and no more than `max_parallel` nodes are
/// in flight at once. Payloads are keyed by graph node id.
pub struct GraphExecutor<P, R> {
    executor: Arc<dyn TreeNodeExecutor<P, R>>,
    callbacks: Arc<dyn ExecutionCallbacks<R>>,
}

impl<P, R> GraphExecutor<P, R>
where
    P: Send + Sync + 'static,
    R: Send + Sync + 'static,
{
    pub fn new(executor: Arc<dyn TreeNodeExecutor<P, R>>) -> Self {
        Self {
            executor,
            callbacks: Arc::new(NoopCallbacks),
        }
    }

    pub fn with_callbacks(mut self, callbacks: Arc<dyn ExecutionCallbacks<R>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Execute every node of `graph`.
    ///
    /// Malformed graphs fail with [`ArborError::InvalidGraph`], cyclic ones
    /// with [`ArborError::CycleDetected`] carrying the first cycle found.
    /// With `continue_on_error` off, a failure skips all later groups.
    pub async fn execute(
        &self,
        graph: &GraphRepresentation,
        payloads: &HashMap<NodeId, P>,
        options: &ExecutionOptions,
    ) -> Result<GraphExecutionResult<R>> {
        graph.check()?;
        let cycles = detect_cycles(graph);
        if let Some(cycle) = cycles.cycles.into_iter().next() {
            return Err(ArborError::CycleDetected(cycle));
        }

        let groups = parallel_groups(graph, options.max_parallel);
        info!(
            nodes = graph.node_ids.len(),
            groups = groups.len(),
            max_parallel = options.max_parallel,
            "Executing graph"
        );

        let mut ctx = ExecutionContext::new(HashMap::new(), payloads, options);
        let total = graph.node_ids.len();
        ctx.run_started(total);

        for (idx, group) in groups.iter().enumerate() {
            let any_failed =
                run_batch(self.executor.as_ref(), self.callbacks.as_ref(), &mut ctx, group).await;
            let done = ctx.report_progress(total);
            self.callbacks.on_progress(done, total).await;

            if any_failed && !options.continue_on_error {
                warn!(group = idx, "Group failed, skipping remaining groups");
                ctx.skip_remaining(groups[idx + 1..].iter().flatten());
                break;
            }
        }

        let result = ctx.finish(groups.concat());
        Ok(GraphExecutionResult { groups, result })
    }
}
