//! Pool statistics snapshots.

use crate::registry::SlotCounts;

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Fixed number of slots.
    pub capacity: usize,
    /// Slots by state.
    pub slots: SlotCounts,
    /// Callers currently queued in `acquire`.
    pub waiters: usize,
    /// Physical connections opened over the pool's life.
    pub created: u64,
    /// Physical connections closed over the pool's life.
    pub destroyed: u64,
    /// Successful acquisitions.
    pub total_acquisitions: u64,
    /// Releases that returned a lease.
    pub total_releases: u64,
    /// Acquisitions that ended in `AcquireTimeout`.
    pub timeouts: u64,
    /// Whether shutdown has begun.
    pub closed: bool,
}

impl PoolStats {
    /// Idle connections ready for hand-out.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.slots.idle
    }

    /// Connections currently lent out.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.slots.in_use
    }

    /// Connections open right now, whichever state they are in.
    #[must_use]
    pub fn live(&self) -> u64 {
        self.created - self.destroyed
    }

    /// The capacity invariant: every slot is in exactly one state.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.slots.total() == self.capacity && self.slots.in_use <= self.capacity
    }
}

/// Outcome of [`Pool::shutdown`](crate::Pool::shutdown).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Shutdown had already been started by an earlier call.
    pub already_closed: bool,
    /// Idle connections closed immediately.
    pub closed_idle: usize,
    /// Waiters woken with `PoolClosed`.
    pub woken_waiters: usize,
    /// Leases returned during the drain window.
    pub drained: usize,
    /// Leases still outstanding at the deadline and revoked.
    ///
    /// Their connections are closed only when they come back to the pool;
    /// one that is never returned is never closed through the connector.
    pub force_closed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consistency_checks_slot_sum() {
        let stats = PoolStats {
            capacity: 3,
            slots: SlotCounts {
                vacant: 1,
                idle: 1,
                in_use: 1,
                invalid: 0,
            },
            ..Default::default()
        };
        assert!(stats.is_consistent());

        let broken = PoolStats {
            capacity: 4,
            ..stats.clone()
        };
        assert!(!broken.is_consistent());
    }

    #[test]
    fn live_counts_open_connections() {
        let stats = PoolStats {
            created: 5,
            destroyed: 2,
            ..Default::default()
        };
        assert_eq!(stats.live(), 3);
    }
}
