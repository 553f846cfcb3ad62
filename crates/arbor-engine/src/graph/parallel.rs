use arbor_core::types::{GraphRepresentation, NodeId};

use super::topo::topological_sort;

/// Split topological levels into groups of at most `max_parallel` nodes.
///
/// Level order and in-level order are preserved. A `max_parallel` of 0 is
/// treated as 1. Returns an empty list when the graph has a cycle.
pub fn parallel_groups(graph: &GraphRepresentation, max_parallel: usize) -> Vec<Vec<NodeId>> {
    let sorted = topological_sort(graph);
    if !sorted.success {
        return vec![];
    }

    let width = max_parallel.max(1);
    sorted
        .levels
        .iter()
        .flat_map(|level| level.chunks(width).map(<[NodeId]>::to_vec))
        .collect()
}
