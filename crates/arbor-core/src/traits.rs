use std::collections::HashMap;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::{ArborError, Result};
use crate::types::{ExecutionId, NodeId, TreeNode};

/// Read-only view handed to a node executor for one node.
pub struct NodeContext<'a, R> {
    pub execution_id: &'a ExecutionId,
    pub node_id: &'a str,
    /// The tree placement being executed (None for graph runs).
    pub placement: Option<&'a TreeNode>,
    /// Results of the nodes completed before this node's batch started.
    pub results: &'a HashMap<NodeId, R>,
    pub cancel: &'a CancellationToken,
}

impl<R> NodeContext<'_, R> {
    /// Result of an already-completed node.
    pub fn result_of(&self, node_id: &str) -> Option<&R> {
        self.results.get(node_id)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// The pluggable unit of work behind every node.
///
/// `P` is the payload keyed by `TreeNode::node_id`, `R` the result type.
pub trait TreeNodeExecutor<P, R>: Send + Sync {
    /// Execute one node. Errors are recorded against the node, never
    /// propagated out of the run.
    fn execute<'a>(&'a self, node: &'a P, ctx: &'a NodeContext<'a, R>)
        -> BoxFuture<'a, Result<R>>;
}

/// Lifecycle callbacks. Every method defaults to a no-op so callers
/// implement only what they need.
pub trait ExecutionCallbacks<R>: Send + Sync {
    fn on_node_start<'a>(&'a self, node_id: &'a str) -> BoxFuture<'a, ()> {
        let _ = node_id;
        Box::pin(async {})
    }

    fn on_node_complete<'a>(&'a self, node_id: &'a str, result: &'a R) -> BoxFuture<'a, ()> {
        let _ = (node_id, result);
        Box::pin(async {})
    }

    fn on_node_error<'a>(&'a self, node_id: &'a str, error: &'a ArborError) -> BoxFuture<'a, ()> {
        let _ = (node_id, error);
        Box::pin(async {})
    }

    fn on_progress(&self, completed: usize, total: usize) -> BoxFuture<'_, ()> {
        let _ = (completed, total);
        Box::pin(async {})
    }
}

/// Callbacks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl<R> ExecutionCallbacks<R> for NoopCallbacks {}
