use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use arbor_core::types::{GraphRepresentation, NodeId};

/// `petgraph` view over the active edges of a graph.
///
/// Node `i` of the `DiGraph` is `node_ids[i]`, so algorithms index their
/// per-node state with plain `usize` and map back to ids at the end.
/// Edges whose endpoints are unknown are left out (see
/// `GraphRepresentation::check`).
#[derive(Debug, Clone)]
pub struct GraphModel {
    graph: DiGraph<NodeId, ()>,
    index: HashMap<NodeId, NodeIndex>,
}

impl GraphModel {
    pub fn new(graph: &GraphRepresentation) -> Self {
        let n = graph.node_ids.len();
        let mut dag = DiGraph::with_capacity(n, graph.edges.len());
        let mut index = HashMap::with_capacity(n);
        for id in &graph.node_ids {
            let idx = dag.add_node(id.clone());
            index.entry(id.clone()).or_insert(idx);
        }

        for edge in graph.active_edges() {
            let (Some(&from), Some(&to)) = (
                index.get(&edge.source_node_id),
                index.get(&edge.target_node_id),
            ) else {
                continue;
            };
            dag.add_edge(from, to, ());
        }

        Self { graph: dag, index }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Id of the node at `idx`.
    pub fn id(&self, idx: usize) -> &str {
        self.graph[NodeIndex::new(idx)].as_str()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).map(|idx| idx.index())
    }

    /// Neighbors of `idx` in `dir`, in edge order.
    ///
    /// petgraph walks a node's edge list newest first; the list is reversed
    /// so results follow the caller's `edges` order. Parallel edges repeat.
    pub fn neighbors(&self, idx: usize, dir: Direction) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .graph
            .neighbors_directed(NodeIndex::new(idx), dir)
            .map(|n| n.index())
            .collect();
        out.reverse();
        out
    }

    /// Map a list of indices back to owned ids.
    pub fn ids(&self, indices: &[usize]) -> Vec<NodeId> {
        indices.iter().map(|&i| self.id(i).to_string()).collect()
    }
}
