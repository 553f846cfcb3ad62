use std::collections::HashMap;

use petgraph::Direction;
use serde::{Deserialize, Serialize};

use arbor_core::types::{GraphRepresentation, NodeId};

use super::model::GraphModel;
use super::topo::order_indices;

const SLACK_TOLERANCE: f64 = 1e-9;

/// Full forward/backward pass output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CriticalPathReport {
    /// Zero-slack nodes in topological order.
    pub path: Vec<NodeId>,
    pub earliest_start: HashMap<NodeId, f64>,
    pub latest_start: HashMap<NodeId, f64>,
    pub slack: HashMap<NodeId, f64>,
    /// Earliest finish of the whole graph.
    pub total_duration: f64,
}

/// Zero-slack nodes of a DAG, in topological order. Empty on a cycle.
pub fn critical_path(graph: &GraphRepresentation, durations: &HashMap<NodeId, f64>) -> Vec<NodeId> {
    critical_path_analysis(graph, durations)
        .map(|report| report.path)
        .unwrap_or_default()
}

/// Run the CPM passes. Returns `None` when the graph is not a DAG.
///
/// Nodes missing from `durations` cost nothing. Sinks are seeded with their
/// own earliest start, so every sink has zero slack.
pub fn critical_path_analysis(
    graph: &GraphRepresentation,
    durations: &HashMap<NodeId, f64>,
) -> Option<CriticalPathReport> {
    let model = GraphModel::new(graph);
    let order = order_indices(&model)?;
    let n = model.len();

    let duration: Vec<f64> = (0..n)
        .map(|i| durations.get(model.id(i)).copied().unwrap_or(0.0))
        .collect();

    // Forward pass
    let mut earliest = vec![0.0_f64; n];
    for &v in &order {
        earliest[v] = model
            .neighbors(v, Direction::Incoming)
            .into_iter()
            .map(|u| earliest[u] + duration[u])
            .fold(0.0, f64::max);
    }

    // Backward pass
    let mut latest = vec![f64::INFINITY; n];
    for &v in order.iter().rev() {
        let successors = model.neighbors(v, Direction::Outgoing);
        latest[v] = if successors.is_empty() {
            earliest[v]
        } else {
            successors
                .iter()
                .map(|&w| latest[w] - duration[v])
                .fold(f64::INFINITY, f64::min)
        };
    }

    let path = order
        .iter()
        .copied()
        .filter(|&v| (latest[v] - earliest[v]).abs() <= SLACK_TOLERANCE)
        .map(|v| model.id(v).to_string())
        .collect();

    let total_duration = (0..n)
        .map(|v| earliest[v] + duration[v])
        .fold(0.0, f64::max);

    let by_id = |values: &[f64]| -> HashMap<NodeId, f64> {
        (0..n).map(|i| (model.id(i).to_string(), values[i])).collect()
    };
    let slack: Vec<f64> = (0..n).map(|i| latest[i] - earliest[i]).collect();

    Some(CriticalPathReport {
        path,
        earliest_start: by_id(&earliest),
        latest_start: by_id(&latest),
        slack: by_id(&slack),
        total_duration,
    })
}
