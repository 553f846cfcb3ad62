//! Execution engine: dependency-graph analysis, tree algorithms, and the
//! executors that drive a pluggable node executor over either structure.

pub mod graph;
pub mod run;
pub mod tree;

pub use graph::{GraphExecutionResult, GraphExecutor};
pub use run::{ExecutionOptions, ExecutionResult, NodeOutcome, NodeStatus};
pub use tree::{TreeExecutionResult, TreeExecutor};
