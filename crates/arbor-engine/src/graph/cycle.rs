use petgraph::Direction;
use serde::{Deserialize, Serialize};

use arbor_core::types::{GraphRepresentation, NodeId};

use super::model::GraphModel;

/// Outcome of cycle detection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleDetectionResult {
    pub has_cycles: bool,
    /// Each cycle starts and ends with the same node id.
    pub cycles: Vec<Vec<NodeId>>,
}

/// Find cycles with a depth-first search over active edges.
///
/// Every back edge met during the search yields one cycle, so a cycle
/// reachable through several entry paths may be reported more than once.
pub fn detect_cycles(graph: &GraphRepresentation) -> CycleDetectionResult {
    let model = GraphModel::new(graph);
    let n = model.len();

    let mut visited = vec![false; n];
    let mut on_stack = vec![false; n];
    let mut path: Vec<usize> = Vec::new();
    let mut cycles = Vec::new();

    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        on_stack[start] = true;
        path.push(start);
        // (node, its successors, index of the next one to look at)
        let mut stack: Vec<(usize, Vec<usize>, usize)> =
            vec![(start, model.neighbors(start, Direction::Outgoing), 0)];

        while let Some((node, successors, next)) = stack.last_mut() {
            let node = *node;
            match successors.get(*next).copied() {
                Some(neighbor) => {
                    *next += 1;
                    if !visited[neighbor] {
                        visited[neighbor] = true;
                        on_stack[neighbor] = true;
                        path.push(neighbor);
                        stack.push((neighbor, model.neighbors(neighbor, Direction::Outgoing), 0));
                    } else if on_stack[neighbor] {
                        if let Some(cycle_start) = path.iter().position(|&p| p == neighbor) {
                            let mut cycle = model.ids(&path[cycle_start..]);
                            cycle.push(model.id(neighbor).to_string());
                            cycles.push(cycle);
                        }
                    }
                }
                None => {
                    on_stack[node] = false;
                    path.pop();
                    stack.pop();
                }
            }
        }
    }

    CycleDetectionResult {
        has_cycles: !cycles.is_empty(),
        cycles,
    }
}
