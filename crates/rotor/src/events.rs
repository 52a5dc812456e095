//! Pool events and the passive listener fan-out

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::trace;

/// Externally observable pool events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolEvent {
    /// Every executor has been constructed
    Ready { thread_count: usize },

    /// An executor replied; `data` is the un-enveloped payload
    Message { slot: usize, data: Value },
}

impl PoolEvent {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    /// Payload of a message event
    pub fn data(&self) -> Option<&Value> {
        match self {
            Self::Message { data, .. } => Some(data),
            Self::Ready { .. } => None,
        }
    }
}

/// Republishes pool events to passive listeners
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<PoolEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// New listener; sees events published after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.tx.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish an event; having no listeners is fine
    pub fn publish(&self, event: PoolEvent) {
        if self.tx.send(event).is_err() {
            trace!("No pool event listeners");
        }
    }
}
