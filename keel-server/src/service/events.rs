//! Event bus
//!
//! Fans status changes out to every connected session. Built on a tokio
//! broadcast channel: each session holds its own receiver, and a receiver
//! that falls behind by more than the channel capacity skips ahead.

use keel_core::dto::message::PipelineEvent;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event; having no subscribers is not an error
    pub fn publish(&self, event: PipelineEvent) {
        match self.sender.send(event) {
            Ok(receivers) => tracing::trace!(receivers, "Event published"),
            Err(_) => tracing::trace!("Event dropped, no subscribers"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }
}
