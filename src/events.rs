use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{PredictionRecord, Student};

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Event {
    StudentCreated(Student),
    StudentUpdated(Student),
    StudentDeleted { id: String },
    PredictionCreated(PredictionRecord),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StudentCreated(_) => "student:created",
            Self::StudentUpdated(_) => "student:updated",
            Self::StudentDeleted { .. } => "student:deleted",
            Self::PredictionCreated(_) => "prediction:created",
        }
    }
}

/// Fan-out channel for change notifications. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns how many subscribers received the event; zero is not an error.
    pub fn publish(&self, event: Event) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => {
                tracing::debug!(event = name, receivers, "event published");
                receivers
            }
            Err(_) => {
                tracing::trace!(event = name, "event dropped, no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
