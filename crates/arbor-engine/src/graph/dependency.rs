use std::collections::HashSet;

use petgraph::Direction;
use serde::{Deserialize, Serialize};

use arbor_core::error::{ArborError, Result};
use arbor_core::types::{GraphRepresentation, NodeId};

use super::model::GraphModel;
use super::topo::level_indices;

/// Direct and transitive dependency relationships of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyInfo {
    pub node_id: NodeId,
    /// Sources of incoming active edges.
    pub direct_dependencies: Vec<NodeId>,
    /// Targets of outgoing active edges.
    pub direct_dependents: Vec<NodeId>,
    pub all_dependencies: Vec<NodeId>,
    pub all_dependents: Vec<NodeId>,
    /// Topological level of the node; `None` when the graph has a cycle.
    pub level: Option<usize>,
}

/// Analyze the dependencies of `node_id`.
pub fn analyze_dependencies(graph: &GraphRepresentation, node_id: &str) -> Result<DependencyInfo> {
    let model = GraphModel::new(graph);
    let target = model
        .index_of(node_id)
        .ok_or_else(|| ArborError::NodeNotFound(node_id.to_string()))?;

    let level = level_indices(&model)
        .and_then(|levels| levels.iter().position(|level| level.contains(&target)));

    Ok(DependencyInfo {
        node_id: node_id.to_string(),
        direct_dependencies: model.ids(&dedup(model.neighbors(target, Direction::Incoming))),
        direct_dependents: model.ids(&dedup(model.neighbors(target, Direction::Outgoing))),
        all_dependencies: model.ids(&reachable(&model, target, Direction::Incoming)),
        all_dependents: model.ids(&reachable(&model, target, Direction::Outgoing)),
        level,
    })
}

fn dedup(indices: Vec<usize>) -> Vec<usize> {
    let mut seen = HashSet::new();
    indices.into_iter().filter(|i| seen.insert(*i)).collect()
}

/// Every node reachable from `start` walking edges in `dir`, excluding `start`.
fn reachable(model: &GraphModel, start: usize, dir: Direction) -> Vec<usize> {
    let mut visited = HashSet::from([start]);
    let mut found = Vec::new();
    let mut stack = vec![start];

    while let Some(current) = stack.pop() {
        for next in model.neighbors(current, dir) {
            if visited.insert(next) {
                found.push(next);
                stack.push(next);
            }
        }
    }
    found
}
