pub mod config;
pub mod error;
pub mod event;
pub mod traits;
pub mod types;

pub use config::EngineConfig;
pub use error::{ArborError, Result};
pub use event::EventBus;
pub use traits::{ExecutionCallbacks, NodeContext, NoopCallbacks, TreeNodeExecutor};
pub use types::*;
