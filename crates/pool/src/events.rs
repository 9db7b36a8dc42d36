//! Event broadcasting for pool lifecycle observability.
//!
//! Provides [`PoolEvent`] variants emitted by the pool and an [`EventBus`]
//! backed by `tokio::sync::broadcast`.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::registry::ConnectionId;

// ---------------------------------------------------------------------------
// PoolEvent
// ---------------------------------------------------------------------------

/// Events emitted during pool lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    /// A physical connection was opened.
    Created {
        /// The new connection.
        connection: ConnectionId,
        /// Slot it occupies.
        slot: usize,
    },
    /// A connection was handed to a caller.
    Acquired {
        /// The connection handed out.
        connection: ConnectionId,
        /// How long the caller waited.
        wait: Duration,
    },
    /// A connection came back and passed its health check.
    Released {
        /// The connection returned.
        connection: ConnectionId,
        /// How long the caller held it.
        held: Duration,
    },
    /// A connection was closed and removed from its slot.
    Retired {
        /// The connection closed.
        connection: ConnectionId,
        /// Why it was closed.
        reason: RetireReason,
    },
    /// A caller gave up waiting.
    Timeout {
        /// Callers still queued at that moment.
        waiters: usize,
    },
    /// Opening a connection failed after every retry.
    ConnectFailed {
        /// Slot that stays vacant.
        slot: usize,
        /// Human-readable error description.
        error: String,
    },
    /// Shutdown began; no further acquisitions are accepted.
    ShutdownStarted,
    /// Shutdown finished.
    ShutdownFinished {
        /// Leases that were still outstanding at the drain deadline.
        force_closed: usize,
    },
}

// ---------------------------------------------------------------------------
// RetireReason
// ---------------------------------------------------------------------------

/// Reason a connection was permanently removed from the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    /// Health check failed on hand-out.
    FailedOnAcquire,
    /// Health check failed on return.
    FailedOnRelease,
    /// The connection outlived `max_lifetime`.
    Expired,
    /// The pool is shutting down.
    Shutdown,
    /// The lease was revoked at the drain deadline and came back later.
    Revoked,
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Broadcast-based event bus for pool lifecycle events.
///
/// Emission is fire-and-forget: if no subscribers are listening or the
/// channel is full, events are dropped (no backpressure on the emitter).
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer size.
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer_size);
        Self { sender }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: PoolEvent) {
        // An error only means there are no active receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to events emitted after this call.
    ///
    /// A subscriber that falls more than `buffer_size` events behind gets a
    /// `Lagged` error and skips ahead.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.sender.receiver_count())
            .finish()
    }
}
