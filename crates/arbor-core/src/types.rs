use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ArborError, Result};

/// Identifier of a graph node or tree placement.
pub type NodeId = String;

/// Unique identifier of a single execution run.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A directed edge. Inactive edges are soft-deleted and ignored by every
/// algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    #[serde(default = "default_is_active")]
    pub is_active: bool,
}

fn default_is_active() -> bool {
    true
}

impl Edge {
    /// Create an active edge.
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            source_node_id: source.into(),
            target_node_id: target.into(),
            is_active: true,
        }
    }

    /// Create a soft-deleted edge.
    pub fn inactive(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            is_active: false,
            ..Self::new(source, target)
        }
    }
}

/// Nodes plus directed edges, as handed in by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphRepresentation {
    pub node_ids: Vec<NodeId>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl GraphRepresentation {
    pub fn new(node_ids: Vec<NodeId>, edges: Vec<Edge>) -> Self {
        Self { node_ids, edges }
    }

    /// Iterate over the edges that take part in the algorithms.
    pub fn active_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(|e| e.is_active)
    }

    /// Verify that ids are unique and every edge endpoint is a known node.
    pub fn check(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.node_ids.len());
        for id in &self.node_ids {
            if !seen.insert(id.as_str()) {
                return Err(ArborError::InvalidGraph(format!(
                    "duplicate node id '{}'",
                    id
                )));
            }
        }
        for edge in &self.edges {
            for endpoint in [&edge.source_node_id, &edge.target_node_id] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(ArborError::InvalidGraph(format!(
                        "edge {} -> {} references unknown node '{}'",
                        edge.source_node_id, edge.target_node_id, endpoint
                    )));
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tree
// ---------------------------------------------------------------------------

/// Structural role of a tree node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNodeType {
    Root,
    Branch,
    Leaf,
}

/// Order in which a tree is walked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraversalStrategy {
    #[default]
    DfsPreOrder,
    DfsInOrder,
    DfsPostOrder,
    Bfs,
}

impl std::str::FromStr for TraversalStrategy {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "dfs_pre_order" | "pre_order" | "preorder" => Ok(Self::DfsPreOrder),
            "dfs_in_order" | "in_order" | "inorder" => Ok(Self::DfsInOrder),
            "dfs_post_order" | "post_order" | "postorder" => Ok(Self::DfsPostOrder),
            "bfs" | "breadth_first" => Ok(Self::Bfs),
            other => Err(ArborError::Config(format!(
                "unknown traversal strategy '{}'",
                other
            ))),
        }
    }
}

/// A placement of a payload inside a rooted tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    /// Key of the payload backing this placement.
    pub node_id: NodeId,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub child_ids: Vec<NodeId>,
    /// Root-to-self ids, inclusive.
    pub path: Vec<NodeId>,
    pub level: usize,
    pub node_type: TreeNodeType,
}

impl TreeNode {
    /// Create a root placement.
    pub fn root(id: impl Into<NodeId>, node_id: impl Into<NodeId>) -> Self {
        let id = id.into();
        Self {
            path: vec![id.clone()],
            id,
            node_id: node_id.into(),
            parent_id: None,
            child_ids: vec![],
            level: 0,
            node_type: TreeNodeType::Root,
        }
    }

    /// Create a leaf placement under `parent`, deriving path and level.
    ///
    /// The parent's `child_ids` is not touched; callers link both sides.
    pub fn child_of(parent: &TreeNode, id: impl Into<NodeId>, node_id: impl Into<NodeId>) -> Self {
        let id = id.into();
        let mut path = parent.path.clone();
        path.push(id.clone());
        Self {
            id,
            node_id: node_id.into(),
            parent_id: Some(parent.id.clone()),
            child_ids: vec![],
            level: parent.level + 1,
            path,
            node_type: TreeNodeType::Leaf,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.child_ids.is_empty()
    }
}

/// Aggregate counts over a set of tree nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub total_nodes: usize,
    pub max_depth: usize,
    pub leaf_nodes: usize,
    pub branch_nodes: usize,
}

/// A rooted tree of placements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree {
    pub id: String,
    pub root_id: NodeId,
    pub nodes: Vec<TreeNode>,
    #[serde(default)]
    pub default_traversal: TraversalStrategy,
    #[serde(default)]
    pub stats: TreeStats,
}

impl Tree {
    /// Build a tree and compute its stats.
    pub fn new(id: impl Into<String>, root_id: impl Into<NodeId>, nodes: Vec<TreeNode>) -> Self {
        let mut tree = Self {
            id: id.into(),
            root_id: root_id.into(),
            nodes,
            default_traversal: TraversalStrategy::default(),
            stats: TreeStats::default(),
        };
        tree.stats = tree.compute_stats();
        tree
    }

    pub fn with_traversal(mut self, strategy: TraversalStrategy) -> Self {
        self.default_traversal = strategy;
        self
    }

    /// Index the placements by id.
    pub fn node_map(&self) -> HashMap<NodeId, TreeNode> {
        self.nodes
            .iter()
            .map(|n| (n.id.clone(), n.clone()))
            .collect()
    }

    pub fn root(&self) -> Option<&TreeNode> {
        self.nodes.iter().find(|n| n.id == self.root_id)
    }

    pub fn compute_stats(&self) -> TreeStats {
        TreeStats {
            total_nodes: self.nodes.len(),
            max_depth: self.nodes.iter().map(|n| n.level).max().unwrap_or(0),
            leaf_nodes: self.nodes.iter().filter(|n| n.is_leaf()).count(),
            branch_nodes: self.nodes.iter().filter(|n| !n.is_leaf()).count(),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Lifecycle events published while a run is in progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    RunStarted {
        execution_id: ExecutionId,
        total: usize,
        at: DateTime<Utc>,
    },
    NodeStarted {
        execution_id: ExecutionId,
        node_id: NodeId,
    },
    NodeCompleted {
        execution_id: ExecutionId,
        node_id: NodeId,
    },
    NodeFailed {
        execution_id: ExecutionId,
        node_id: NodeId,
        error: String,
    },
    NodeSkipped {
        execution_id: ExecutionId,
        node_id: NodeId,
    },
    Progress {
        execution_id: ExecutionId,
        completed: usize,
        total: usize,
    },
    RunFinished {
        execution_id: ExecutionId,
        success: bool,
        elapsed_ms: u64,
        at: DateTime<Utc>,
    },
}
