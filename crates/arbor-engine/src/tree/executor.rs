use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{debug, info, warn};

use arbor_core::error::{ArborError, Result};
use arbor_core::traits::{ExecutionCallbacks, NoopCallbacks, TreeNodeExecutor};
use arbor_core::types::{NodeId, Tree, TreeNodeType};

use super::subtree::get_subtree;
use super::traversal::traverse;
use super::validate::validate_tree;
use crate::run::{run_batch, run_node, ExecutionContext, ExecutionOptions, ExecutionResult};

/// Result of a tree run.
pub type TreeExecutionResult<R> = ExecutionResult<R>;

/// Drives a pluggable node executor over a tree.
///
/// `P` is the payload type keyed by `TreeNode::node_id`, `R` the per-node
/// result. Sequential modes await each node before starting the next;
/// [`TreeExecutor::execute_by_level`] runs each level concurrently.
pub struct TreeExecutor<P, R> {
    executor: Arc<dyn TreeNodeExecutor<P, R>>,
    callbacks: Arc<dyn ExecutionCallbacks<R>>,
}

impl<P, R> TreeExecutor<P, R>
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

    /// Set the lifecycle callbacks.
    pub fn with_callbacks(mut self, callbacks: Arc<dyn ExecutionCallbacks<R>>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Validate the tree, traverse it, and run every visited node in order.
    ///
    /// Fails fast with [`ArborError::InvalidTree`] when validation reports
    /// errors; node failures never surface as `Err`.
    pub async fn execute(
        &self,
        tree: &Tree,
        payloads: &HashMap<NodeId, P>,
        options: &ExecutionOptions,
    ) -> Result<TreeExecutionResult<R>> {
        let validation = validate_tree(tree);
        if !validation.is_valid {
            return Err(ArborError::InvalidTree(validation.errors));
        }
        for warning in &validation.warnings {
            warn!(tree_id = %tree.id, "{}", warning);
        }

        let node_map = tree.node_map();
        let root = node_map
            .get(&tree.root_id)
            .ok_or_else(|| ArborError::NodeNotFound(tree.root_id.clone()))?;
        let strategy = options.traversal.unwrap_or(tree.default_traversal);
        let order = traverse(root, &node_map, strategy, options.max_depth).visit_order;

        info!(tree_id = %tree.id, ?strategy, nodes = order.len(), "Executing tree");
        let ctx = ExecutionContext::new(node_map, payloads, options);
        Ok(self.run_sequence(ctx, order, options).await)
    }

    /// Run the subtree rooted at `root_node_id` as a standalone tree.
    pub async fn execute_subtree(
        &self,
        tree: &Tree,
        root_node_id: &str,
        payloads: &HashMap<NodeId, P>,
        options: &ExecutionOptions,
    ) -> Result<TreeExecutionResult<R>> {
        let subtree = get_subtree(&tree.node_map(), root_node_id, options.max_depth)
            .ok_or_else(|| ArborError::NodeNotFound(root_node_id.to_string()))?;

        debug!(
            tree_id = %tree.id,
            root = %root_node_id,
            nodes = subtree.stats.total_nodes,
            "Extracted subtree"
        );
        let sub_tree = subtree
            .into_tree(format!("{}/{}", tree.id, root_node_id))
            .with_traversal(tree.default_traversal);
        self.execute(&sub_tree, payloads, options).await
    }

    /// Run only the leaf nodes, sequentially, in stored node order.
    pub async fn execute_leaves(
        &self,
        tree: &Tree,
        payloads: &HashMap<NodeId, P>,
        options: &ExecutionOptions,
    ) -> Result<TreeExecutionResult<R>> {
        let order: Vec<NodeId> = tree
            .nodes
            .iter()
            .filter(|n| n.node_type == TreeNodeType::Leaf)
            .map(|n| n.id.clone())
            .collect();

        info!(tree_id = %tree.id, leaves = order.len(), "Executing tree leaves");
        let ctx = ExecutionContext::new(tree.node_map(), payloads, options);
        Ok(self.run_sequence(ctx, order, options).await)
    }

    /// Run the tree level by level, each level concurrently.
    ///
    /// Levels come from the stored `level` field. A level settles entirely
    /// before the next starts; with `continue_on_error` off, a failure in
    /// level *k* skips every node in deeper levels.
    pub async fn execute_by_level(
        &self,
        tree: &Tree,
        payloads: &HashMap<NodeId, P>,
        options: &ExecutionOptions,
    ) -> Result<TreeExecutionResult<R>> {
        let mut by_level: BTreeMap<usize, Vec<NodeId>> = BTreeMap::new();
        for node in &tree.nodes {
            by_level.entry(node.level).or_default().push(node.id.clone());
        }
        let levels: Vec<Vec<NodeId>> = by_level.into_values().collect();

        info!(tree_id = %tree.id, levels = levels.len(), "Executing tree by level");
        let mut ctx = ExecutionContext::new(tree.node_map(), payloads, options);
        let total = tree.nodes.len();
        ctx.run_started(total);

        for (depth, level) in levels.iter().enumerate() {
            let any_failed =
                run_batch(self.executor.as_ref(), self.callbacks.as_ref(), &mut ctx, level).await;
            let done = ctx.report_progress(total);
            self.callbacks.on_progress(done, total).await;

            if any_failed && !options.continue_on_error {
                warn!(level = depth, "Level failed, skipping deeper levels");
                ctx.skip_remaining(levels[depth + 1..].iter().flatten());
                break;
            }
        }

        Ok(ctx.finish(levels.concat()))
    }

    /// Run `order` one node at a time.
    async fn run_sequence(
        &self,
        mut ctx: ExecutionContext<'_, P, R>,
        order: Vec<NodeId>,
        options: &ExecutionOptions,
    ) -> TreeExecutionResult<R> {
        let total = order.len();
        ctx.run_started(total);

        for (idx, id) in order.iter().enumerate() {
            let outcome = {
                let node_ctx = ctx.node_context(id);
                run_node(
                    self.executor.as_ref(),
                    self.callbacks.as_ref(),
                    ctx.payload(id),
                    &node_ctx,
                    ctx.event_bus(),
                )
                .await
            };
            let failed = ctx.settle(id, outcome, self.callbacks.as_ref()).await;
            let done = ctx.report_progress(total);
            self.callbacks.on_progress(done, total).await;

            if failed && !options.continue_on_error {
                warn!(node_id = %id, "Node failed, halting execution");
                ctx.skip_remaining(&order[idx + 1..]);
                break;
            }
        }

        ctx.finish(order)
    }
}
