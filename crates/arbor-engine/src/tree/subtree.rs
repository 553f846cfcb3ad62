use std::collections::{HashMap, HashSet};

use serde::Serialize;

use arbor_core::types::{NodeId, Tree, TreeNode, TreeNodeType, TreeStats};

/// A bounded-depth slice of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subtree {
    pub root_id: NodeId,
    /// Original placements in pre-order, unchanged.
    pub nodes: Vec<TreeNode>,
    pub stats: TreeStats,
}

/// Collect the nodes within `max_depth` of `root_id` (the root is depth 0).
///
/// Branch and leaf counts are taken inside the extracted slice: a node whose
/// children all lie beyond the depth limit counts as a leaf.
pub fn get_subtree(
    node_map: &HashMap<NodeId, TreeNode>,
    root_id: &str,
    max_depth: Option<usize>,
) -> Option<Subtree> {
    let root = node_map.get(root_id)?;

    let mut nodes = Vec::new();
    let mut stats = TreeStats::default();
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack = vec![(root, 0usize)];

    while let Some((node, depth)) = stack.pop() {
        if !seen.insert(node.id.as_str()) {
            continue;
        }
        stats.max_depth = stats.max_depth.max(depth);

        let within = max_depth.map_or(true, |max| depth < max);
        let kids: Vec<&TreeNode> = if within {
            node.child_ids.iter().filter_map(|id| node_map.get(id)).collect()
        } else {
            vec![]
        };
        if kids.is_empty() {
            stats.leaf_nodes += 1;
        } else {
            stats.branch_nodes += 1;
        }
        stack.extend(kids.into_iter().rev().map(|c| (c, depth + 1)));
        nodes.push(node.clone());
    }
    stats.total_nodes = nodes.len();

    Some(Subtree {
        root_id: root_id.to_string(),
        nodes,
        stats,
    })
}

impl Subtree {
    /// Re-root the slice into a standalone tree.
    ///
    /// Paths and levels are rebased onto the new root, the root loses its
    /// parent, child lists drop ids outside the slice, and node types are
    /// recomputed.
    pub fn into_tree(self, tree_id: impl Into<String>) -> Tree {
        let included: HashSet<NodeId> = self.nodes.iter().map(|n| n.id.clone()).collect();
        let offset = self
            .nodes
            .first()
            .map(|root| root.path.len().saturating_sub(1))
            .unwrap_or(0);

        let nodes = self
            .nodes
            .into_iter()
            .map(|mut node| {
                let is_root = node.id == self.root_id;
                node.path = node.path.get(offset..).map(<[NodeId]>::to_vec).unwrap_or_default();
                node.level = node.path.len().saturating_sub(1);
                node.child_ids.retain(|c| included.contains(c));
                if is_root {
                    node.parent_id = None;
                }
                node.node_type = if is_root {
                    TreeNodeType::Root
                } else if node.child_ids.is_empty() {
                    TreeNodeType::Leaf
                } else {
                    TreeNodeType::Branch
                };
                node
            })
            .collect();

        Tree::new(tree_id, self.root_id, nodes)
    }
}
