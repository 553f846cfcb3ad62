use std::collections::HashMap;

use serde::Serialize;

use arbor_core::types::{NodeId, TreeNode};

/// Route between two tree nodes through their lowest common ancestor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreePath {
    /// `from`, up to the LCA, then down to `to`.
    pub path: Vec<NodeId>,
    pub length: usize,
}

/// Length of the shared root prefix of two stored paths.
fn common_prefix_len(a: &TreeNode, b: &TreeNode) -> usize {
    a.path
        .iter()
        .zip(&b.path)
        .take_while(|(x, y)| x == y)
        .count()
}

/// Deepest node that is an ancestor of both `a` and `b` (a node counts as
/// its own ancestor).
pub fn find_lowest_common_ancestor(
    node_map: &HashMap<NodeId, TreeNode>,
    a: &str,
    b: &str,
) -> Option<NodeId> {
    let (a, b) = (node_map.get(a)?, node_map.get(b)?);
    let shared = common_prefix_len(a, b);
    a.path.get(shared.checked_sub(1)?).cloned()
}

/// Path from `from` to `to` by way of their lowest common ancestor.
pub fn find_path(node_map: &HashMap<NodeId, TreeNode>, from: &str, to: &str) -> Option<TreePath> {
    let (from, to) = (node_map.get(from)?, node_map.get(to)?);
    let shared = common_prefix_len(from, to);
    let lca_index = shared.checked_sub(1)?;

    let mut path: Vec<NodeId> = from.path[lca_index..].iter().rev().cloned().collect();
    path.extend(to.path[shared..].iter().cloned());

    Some(TreePath {
        length: path.len(),
        path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root -> a -> {b, c}, root -> d
    fn sample() -> HashMap<NodeId, TreeNode> {
        let mut root = TreeNode::root("root", "root");
        let mut a = TreeNode::child_of(&root, "a", "a");
        let d = TreeNode::child_of(&root, "d", "d");
        let b = TreeNode::child_of(&a, "b", "b");
        let c = TreeNode::child_of(&a, "c", "c");
        root.child_ids = vec!["a".into(), "d".into()];
        a.child_ids = vec!["b".into(), "c".into()];
        [root, a, b, c, d]
            .into_iter()
            .map(|n| (n.id.clone(), n))
            .collect()
    }

    #[test]
    fn test_lca_of_siblings() {
        let map = sample();
        assert_eq!(find_lowest_common_ancestor(&map, "b", "c").as_deref(), Some("a"));
        assert_eq!(find_lowest_common_ancestor(&map, "b", "d").as_deref(), Some("root"));
    }

    #[test]
    fn test_path_between_siblings() {
        let map = sample();
        let path = find_path(&map, "b", "c").unwrap();
        assert_eq!(path.path, vec!["b", "a", "c"]);
        assert_eq!(path.length, 3);
    }

    #[test]
    fn test_path_across_root() {
        let map = sample();
        let path = find_path(&map, "c", "d").unwrap();
        assert_eq!(path.path, vec!["c", "a", "root", "d"]);
    }

    #[test]
    fn test_path_to_ancestor() {
        let map = sample();
        assert_eq!(find_path(&map, "b", "root").unwrap().path, vec!["b", "a", "root"]);
        assert_eq!(find_path(&map, "root", "b").unwrap().path, vec!["root", "a", "b"]);
        assert_eq!(find_lowest_common_ancestor(&map, "a", "b").as_deref(), Some("a"));
    }

    #[test]
    fn test_path_to_self() {
        let map = sample();
        let path = find_path(&map, "b", "b").unwrap();
        assert_eq!(path.path, vec!["b"]);
        assert_eq!(path.length, 1);
    }

    #[test]
    fn test_unknown_node() {
        let map = sample();
        assert!(find_path(&map, "b", "nope").is_none());
        assert!(find_lowest_common_ancestor(&map, "nope", "b").is_none());
    }
}
