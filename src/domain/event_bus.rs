//! Broadcast channel for grid events.
//!
//! [`EventBus`] wraps a [`tokio::sync::broadcast`] channel. The service
//! layer publishes a [`GridEvent`] after every state mutation and each
//! WebSocket connection subscribes to receive filtered events.

use tokio::sync::broadcast;

use super::GridEvent;

/// Broadcast bus for [`GridEvent`]s.
///
/// Backed by a ring buffer of configurable capacity; when it fills up,
/// the oldest events are dropped for lagging receivers. Publishing with
/// no active receivers silently drops the event — the bus is pure
/// observability plumbing.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GridEvent>,
}

impl EventBus {
    /// Creates a new `EventBus` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers, returning how many
    /// receivers got it.
    pub fn publish(&self, event: GridEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<GridEvent> {
        self.sender.subscribe()
    }

    /// Current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
