use tokio::sync::broadcast;

use crate::types::{ExecutionEvent, ExecutionId};

/// Fan-out of execution events over a tokio broadcast channel.
///
/// Publishing never blocks and never fails; events sent while nobody is
/// subscribed are dropped, and slow subscribers observe `Lagged`.
pub struct EventBus {
    tx: broadcast::Sender<ExecutionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ExecutionEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ExecutionEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ExecutionEvent {
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            Self::RunStarted { execution_id, .. }
            | Self::NodeStarted { execution_id, .. }
            | Self::NodeCompleted { execution_id, .. }
            | Self::NodeFailed { execution_id, .. }
            | Self::NodeSkipped { execution_id, .. }
            | Self::Progress { execution_id, .. }
            | Self::RunFinished { execution_id, .. } => execution_id,
        }
    }

    /// Node the event is about, if any.
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::NodeSkipped { node_id, .. } => Some(node_id),
            _ => None,
        }
    }
}
