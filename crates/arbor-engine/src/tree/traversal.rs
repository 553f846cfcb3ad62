use std::collections::{HashMap, HashSet, VecDeque};

use serde::Serialize;

use arbor_core::types::{NodeId, TraversalStrategy, TreeNode};

/// Nodes in visit order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraversalResult {
    pub nodes: Vec<TreeNode>,
    pub visit_order: Vec<NodeId>,
}

impl TraversalResult {
    fn visit(&mut self, node: &TreeNode) {
        self.visit_order.push(node.id.clone());
        self.nodes.push(node.clone());
    }
}

/// Pending work on the explicit DFS stack.
enum Frame<'t> {
    Expand(&'t TreeNode, usize),
    Visit(&'t TreeNode),
}

/// Walk the tree below `root` with the given strategy.
///
/// Nodes deeper than `max_depth` (root = depth 0) are left out entirely.
/// Child ids missing from `node_map` are ignored, and a node reachable
/// twice is visited once.
pub fn traverse(
    root: &TreeNode,
    node_map: &HashMap<NodeId, TreeNode>,
    strategy: TraversalStrategy,
    max_depth: Option<usize>,
) -> TraversalResult {
    match strategy {
        TraversalStrategy::Bfs => breadth_first(root, node_map, max_depth),
        dfs => depth_first(root, node_map, dfs, max_depth),
    }
}

/// Children of `node` within the depth limit, in `child_ids` order.
fn children<'t>(
    node: &TreeNode,
    depth: usize,
    node_map: &'t HashMap<NodeId, TreeNode>,
    max_depth: Option<usize>,
) -> Vec<&'t TreeNode> {
    if max_depth.is_some_and(|max| depth >= max) {
        return vec![];
    }
    node.child_ids
        .iter()
        .filter_map(|id| node_map.get(id))
        .collect()
}

fn depth_first<'t>(
    root: &'t TreeNode,
    node_map: &'t HashMap<NodeId, TreeNode>,
    strategy: TraversalStrategy,
    max_depth: Option<usize>,
) -> TraversalResult {
    let mut result = TraversalResult::default();
    let mut expanded: HashSet<&str> = HashSet::new();
    let mut stack = vec![Frame::Expand(root, 0)];

    while let Some(frame) = stack.pop() {
        let (node, depth) = match frame {
            Frame::Visit(node) => {
                result.visit(node);
                continue;
            }
            Frame::Expand(node, depth) => (node, depth),
        };
        if !expanded.insert(node.id.as_str()) {
            continue;
        }

        let kids = children(node, depth, node_map, max_depth);
        let below = depth + 1;
        // Frames are pushed in reverse so they pop in visit order.
        match strategy {
            TraversalStrategy::DfsPostOrder => {
                stack.push(Frame::Visit(node));
                stack.extend(kids.iter().rev().map(|c| Frame::Expand(c, below)));
            }
            TraversalStrategy::DfsInOrder => {
                // first child is "left", second "right", the rest follow
                stack.extend(kids.iter().skip(1).rev().map(|c| Frame::Expand(c, below)));
                stack.push(Frame::Visit(node));
                if let Some(left) = kids.first() {
                    stack.push(Frame::Expand(left, below));
                }
            }
            _ => {
                stack.extend(kids.iter().rev().map(|c| Frame::Expand(c, below)));
                stack.push(Frame::Visit(node));
            }
        }
    }
    result
}

fn breadth_first(
    root: &TreeNode,
    node_map: &HashMap<NodeId, TreeNode>,
    max_depth: Option<usize>,
) -> TraversalResult {
    let mut result = TraversalResult::default();
    let mut seen: HashSet<&str> = HashSet::from([root.id.as_str()]);
    let mut queue = VecDeque::from([(root, 0usize)]);

    while let Some((node, depth)) = queue.pop_front() {
        result.visit(node);
        for child in children(node, depth, node_map, max_depth) {
            if seen.insert(child.id.as_str()) {
                queue.push_back((child, depth + 1));
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    /// r
    /// ├── a
    /// │   ├── a1
    /// │   └── a2
    /// ├── b
    /// └── c
    ///     └── c1
    fn sample() -> HashMap<NodeId, TreeNode> {
        let mut r = TreeNode::root("r", "r");
        let mut a = TreeNode::child_of(&r, "a", "a");
        let b = TreeNode::child_of(&r, "b", "b");
        let mut c = TreeNode::child_of(&r, "c", "c");
        let a1 = TreeNode::child_of(&a, "a1", "a1");
        let a2 = TreeNode::child_of(&a, "a2", "a2");
        let c1 = TreeNode::child_of(&c, "c1", "c1");
        r.child_ids = vec!["a".into(), "b".into(), "c".into()];
        a.child_ids = vec!["a1".into(), "a2".into()];
        c.child_ids = vec!["c1".into()];
        [r, a, b, c, a1, a2, c1]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect()
    }

    fn order(strategy: TraversalStrategy, max_depth: Option<usize>) -> Vec<NodeId> {
        let map = sample();
        traverse(&map["r"], &map, strategy, max_depth).visit_order
    }

    #[test]
    fn test_pre_order() {
        assert_eq!(
            order(TraversalStrategy::DfsPreOrder, None),
            vec!["r", "a", "a1", "a2", "b", "c", "c1"]
        );
    }

    #[test]
    fn test_post_order() {
        assert_eq!(
            order(TraversalStrategy::DfsPostOrder, None),
            vec!["a1", "a2", "a", "b", "c1", "c", "r"]
        );
    }

    #[test]
    fn test_in_order_generalized() {
        // left subtree, node, right subtree, then any further children
        assert_eq!(
            order(TraversalStrategy::DfsInOrder, None),
            vec!["a1", "a", "a2", "r", "b", "c1", "c"]
        );
    }

    #[test]
    fn test_bfs() {
        assert_eq!(
            order(TraversalStrategy::Bfs, None),
            vec!["r", "a", "b", "c", "a1", "a2", "c1"]
        );
    }

    #[test]
    fn test_max_depth_excludes_deeper_nodes() {
        assert_eq!(order(TraversalStrategy::DfsPreOrder, Some(1)), vec!["r", "a", "b", "c"]);
        assert_eq!(order(TraversalStrategy::DfsPostOrder, Some(1)), vec!["a", "b", "c", "r"]);
        assert_eq!(order(TraversalStrategy::Bfs, Some(0)), vec!["r"]);
    }

    #[test]
    fn test_depth_is_relative_to_traversal_root() {
        let map = sample();
        let result = traverse(&map["a"], &map, TraversalStrategy::DfsPreOrder, Some(1));
        assert_eq!(result.visit_order, vec!["a", "a1", "a2"]);
        assert_eq!(result.nodes.len(), 3);
    }

    #[test]
    fn test_missing_child_is_ignored() {
        let mut map = sample();
        map.get_mut("b").unwrap().child_ids = vec!["ghost".into()];
        let result = traverse(&map["r"], &map, TraversalStrategy::Bfs, None);
        assert_eq!(result.visit_order.len(), 7);
    }
}
