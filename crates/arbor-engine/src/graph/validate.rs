use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use arbor_core::types::{GraphRepresentation, NodeId};

use super::cycle::detect_cycles;
use super::topo::topological_sort;

/// Combined structural verdict on a graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphValidationResult {
    pub is_valid: bool,
    pub is_dag: bool,
    pub has_cycles: bool,
    pub cycles: Vec<Vec<NodeId>>,
    /// Nodes touched by no active edge.
    pub isolated_nodes: Vec<NodeId>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Validate a graph: representation integrity, cycles, isolated nodes and
/// a full topological sort. Isolated nodes only produce a warning.
pub fn validate_graph(graph: &GraphRepresentation) -> GraphValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if let Err(e) = graph.check() {
        errors.push(e.to_string());
    }

    let cycle_result = detect_cycles(graph);
    if cycle_result.has_cycles {
        errors.push(format!(
            "Graph contains {} cycle(s)",
            cycle_result.cycles.len()
        ));
    }

    let isolated_nodes = isolated_nodes(graph);
    if !isolated_nodes.is_empty() {
        warnings.push(format!(
            "Graph contains {} isolated node(s)",
            isolated_nodes.len()
        ));
    }

    let is_dag = topological_sort(graph).success;

    GraphValidationResult {
        is_valid: is_dag && errors.is_empty(),
        is_dag,
        has_cycles: cycle_result.has_cycles,
        cycles: cycle_result.cycles,
        isolated_nodes,
        errors,
        warnings,
    }
}

/// Nodes that appear in no active edge, in input order.
pub fn isolated_nodes(graph: &GraphRepresentation) -> Vec<NodeId> {
    let touched: HashSet<&str> = graph
        .active_edges()
        .flat_map(|e| [e.source_node_id.as_str(), e.target_node_id.as_str()])
        .collect();

    graph
        .node_ids
        .iter()
        .filter(|id| !touched.contains(id.as_str()))
        .cloned()
        .collect()
}
