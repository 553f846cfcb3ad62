use petgraph::Direction;
use serde::{Deserialize, Serialize};

use arbor_core::types::{GraphRepresentation, NodeId};

use super::model::GraphModel;

pub const CYCLE_ERROR: &str = "Graph contains cycles";

/// Outcome of a topological sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologicalSortResult {
    pub success: bool,
    /// Level-major flattening of `levels`.
    pub order: Vec<NodeId>,
    /// Waves of nodes with no dependency among them.
    pub levels: Vec<Vec<NodeId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Order the graph with Kahn's algorithm, one level per wave.
///
/// Nodes within a level keep their `node_ids` order.
pub fn topological_sort(graph: &GraphRepresentation) -> TopologicalSortResult {
    let model = GraphModel::new(graph);
    match level_indices(&model) {
        Some(levels) => {
            let levels: Vec<Vec<NodeId>> = levels.iter().map(|l| model.ids(l)).collect();
            TopologicalSortResult {
                success: true,
                order: levels.concat(),
                levels,
                error: None,
            }
        }
        None => TopologicalSortResult {
            success: false,
            order: vec![],
            levels: vec![],
            error: Some(CYCLE_ERROR.to_string()),
        },
    }
}

/// Kahn levels as node indices, or `None` when a cycle leaves nodes unordered.
pub(crate) fn level_indices(model: &GraphModel) -> Option<Vec<Vec<usize>>> {
    let n = model.len();
    let mut in_degree: Vec<usize> = (0..n)
        .map(|i| model.neighbors(i, Direction::Incoming).len())
        .collect();

    let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut levels = Vec::new();
    let mut ordered = 0;

    while !current.is_empty() {
        let mut next = Vec::new();
        for &u in &current {
            for v in model.neighbors(u, Direction::Outgoing) {
                in_degree[v] -= 1;
                if in_degree[v] == 0 {
                    next.push(v);
                }
            }
        }
        next.sort_unstable();
        ordered += current.len();
        levels.push(std::mem::replace(&mut current, next));
    }

    (ordered == n).then_some(levels)
}

/// Flattened topological order as node indices.
pub(crate) fn order_indices(model: &GraphModel) -> Option<Vec<usize>> {
    level_indices(model).map(|levels| levels.concat())
}
