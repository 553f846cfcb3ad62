use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArborError {
    // Structural errors
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    #[error("Invalid tree: {}", .0.join("; "))]
    InvalidTree(Vec<String>),

    #[error("Cycle detected involving nodes: {0:?}")]
    CycleDetected(Vec<String>),

    #[error("Node not found: {0}")]
    NodeNotFound(String),

    // Execution errors
    #[error("Node execution failed: {node}: {message}")]
    NodeExecution { node: String, message: String },

    #[error("Execution cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ArborError {
    /// Shorthand for a node-level execution failure.
    pub fn node_failed(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::NodeExecution {
            node: node.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ArborError>;
