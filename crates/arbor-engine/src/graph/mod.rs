//! Dependency-graph algorithms over [`GraphRepresentation`].
//!
//! Every algorithm ignores inactive edges. Each call loads the active edges
//! into a `petgraph` `DiGraph` (`GraphModel`) and walks it with explicit
//! stacks and queues, so deep graphs cannot overflow the call stack.
//!
//! [`GraphRepresentation`]: arbor_core::types::GraphRepresentation

pub mod critical_path;
pub mod cycle;
pub mod dependency;
pub mod executor;
pub(crate) mod model;
pub mod parallel;
pub mod topo;
pub mod validate;

pub use critical_path::{critical_path, critical_path_analysis, CriticalPathReport};
pub use cycle::{detect_cycles, CycleDetectionResult};
pub use dependency::{analyze_dependencies, DependencyInfo};
pub use executor::{GraphExecutionResult, GraphExecutor};
pub use parallel::parallel_groups;
pub use topo::{topological_sort, TopologicalSortResult};
pub use validate::{isolated_nodes, validate_graph, GraphValidationResult};
