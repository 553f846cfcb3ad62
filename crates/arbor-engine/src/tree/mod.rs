//! Hierarchical tree algorithms and the tree executor.

pub mod executor;
pub mod path;
pub mod subtree;
pub mod traversal;
pub mod validate;

pub use executor::{TreeExecutionResult, TreeExecutor};
pub use path::{find_lowest_common_ancestor, find_path, TreePath};
pub use subtree::{get_subtree, Subtree};
pub use traversal::{traverse, TraversalResult};
pub use validate::{validate_tree, TreeValidationResult};
