//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] carries [`ChangeEvent`]s from the mutation endpoints to the
//! realtime fan-out. It is shared via `Arc<EventBus>` across the application.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use curator_core::realtime::RowChange;

// ---------------------------------------------------------------------------
// ChangeEvent
// ---------------------------------------------------------------------------

/// A committed row change.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeEvent {
    pub change: RowChange,

    /// When the change was published (UTC).
    pub committed_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(change: RowChange) -> Self {
        Self {
            change,
            committed_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// When the buffer is full the oldest unconsumed events are dropped and slow
/// receivers observe `RecvError::Lagged`. The realtime router answers a
/// lag by closing its sockets so clients resynchronise.
pub struct EventBus {
    sender: broadcast::Sender<ChangeEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a committed change to all current subscribers.
    ///
    /// If there are no active subscribers the change is silently dropped.
    pub fn publish(&self, change: RowChange) {
        tracing::trace!(
            table = %change.table(),
            event_type = %change.event_type,
            owner_id = change.owner_id,
            "Publishing row change"
        );
        // Ignore the SendError: it only means there are zero receivers.
        let _ = self.sender.send(ChangeEvent::new(change));
    }

    /// Publish several changes of one committed mutation, in order.
    pub fn publish_all(&self, changes: impl IntoIterator<Item = RowChange>) {
        for change in changes {
            self.publish(change);
        }
    }

    /// Subscribe to all changes published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
