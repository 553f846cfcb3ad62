use std::collections::{HashMap, HashSet};

use serde::Serialize;

use arbor_core::types::{NodeId, Tree};

/// Structural verdict on a tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TreeValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    /// Orphan notices; these do not make the tree invalid.
    pub warnings: Vec<String>,
    pub orphaned_nodes: Vec<NodeId>,
}

/// Walk the tree from its root and check every structural invariant.
///
/// Errors: missing root, duplicate ids, revisited nodes, stored path or
/// level not matching the walk, children missing or pointing at another
/// parent. Nodes never reached from the root are reported as orphans.
pub fn validate_tree(tree: &Tree) -> TreeValidationResult {
    let mut errors = Vec::new();

    let mut node_map = HashMap::with_capacity(tree.nodes.len());
    for node in &tree.nodes {
        if node_map.insert(node.id.as_str(), node).is_some() {
            errors.push(format!("Duplicate node id '{}'", node.id));
        }
    }

    let Some(root) = node_map.get(tree.root_id.as_str()) else {
        errors.push(format!("Root node '{}' not found", tree.root_id));
        return TreeValidationResult {
            is_valid: false,
            errors,
            ..TreeValidationResult::default()
        };
    };
    if let Some(parent) = &root.parent_id {
        errors.push(format!(
            "Root node '{}' has parent '{}'",
            root.id, parent
        ));
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut stack: Vec<(&str, Vec<NodeId>)> = vec![(root.id.as_str(), vec![root.id.clone()])];

    while let Some((id, expected_path)) = stack.pop() {
        if !visited.insert(id) {
            errors.push(format!("Cycle detected: node '{}' reached twice", id));
            continue;
        }
        let Some(node) = node_map.get(id) else {
            continue;
        };

        if node.path != expected_path {
            errors.push(format!(
                "Node '{}' has path {:?}, expected {:?}",
                id, node.path, expected_path
            ));
        }
        let expected_level = expected_path.len() - 1;
        if node.level != expected_level {
            errors.push(format!(
                "Node '{}' has level {}, expected {}",
                id, node.level, expected_level
            ));
        }

        for child_id in node.child_ids.iter().rev() {
            match node_map.get(child_id.as_str()) {
                None => errors.push(format!(
                    "Node '{}' references missing child '{}'",
                    id, child_id
                )),
                Some(child) => {
                    if child.parent_id.as_deref() != Some(id) {
                        errors.push(format!(
                            "Child '{}' of '{}' points to parent {:?}",
                            child_id, id, child.parent_id
                        ));
                    }
                    let mut path = expected_path.clone();
                    path.push(child_id.clone());
                    stack.push((child.id.as_str(), path));
                }
            }
        }
    }

    let orphaned_nodes: Vec<NodeId> = tree
        .nodes
        .iter()
        .filter(|n| !visited.contains(n.id.as_str()))
        .map(|n| n.id.clone())
        .collect();
    let warnings = orphaned_nodes
        .iter()
        .map(|id| format!("Node '{}' is not reachable from the root", id))
        .collect();

    TreeValidationResult {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        orphaned_nodes,
    }
}
