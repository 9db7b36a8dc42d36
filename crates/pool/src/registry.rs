//! Fixed-capacity slot registry.
//!
//! Every mutation happens under the pool lock; nothing here awaits.

use std::fmt;

use tokio::time::Instant;

/// Lifecycle state of one pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// No connection has been opened for this slot yet, or its last one was
    /// retired and could not be replaced.
    Vacant,
    /// Holds an open connection ready to be handed out.
    Idle,
    /// Lent to exactly one caller.
    InUse,
    /// Failed validation; its connection is being closed and replaced.
    Invalid,
}

/// Identifier of one physical connection, unique for the life of a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Per-state slot counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SlotCounts {
    /// Slots without a connection
    pub vacant: usize,
    /// Slots holding an idle connection
    pub idle: usize,
    /// Slots lent to callers
    pub in_use: usize,
    /// Slots whose connection is being retired
    pub invalid: usize,
}

impl SlotCounts {
    /// Sum over all states; always equals the pool capacity.
    #[must_use]
    pub fn total(&self) -> usize {
        self.vacant + self.idle + self.in_use + self.invalid
    }
}

/// A slot reserved for one caller, with the idle connection if it had one.
pub(crate) struct Grant<T> {
    pub(crate) slot: usize,
    pub(crate) generation: u64,
    pub(crate) conn: Option<T>,
}

/// What the pool knows about a lease that is being returned.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Returning {
    pub(crate) connection_id: Option<ConnectionId>,
    pub(crate) created_at: Option<Instant>,
    pub(crate) revoked: bool,
}

struct Slot<T> {
    state: SlotState,
    conn: Option<T>,
    connection_id: Option<ConnectionId>,
    generation: u64,
    created_at: Option<Instant>,
    last_validated: Option<Instant>,
    returning: bool,
    revoked: bool,
}

impl<T> Slot<T> {
    fn vacant() -> Self {
        Self {
            state: SlotState::Vacant,
            conn: None,
            connection_id: None,
            generation: 0,
            created_at: None,
            last_validated: None,
            returning: false,
            revoked: false,
        }
    }

    fn clear(&mut self) {
        self.state = SlotState::Vacant;
        self.conn = None;
        self.connection_id = None;
        self.created_at = None;
        self.last_validated = None;
        self.returning = false;
        self.revoked = false;
    }
}

pub(crate) struct Registry<T> {
    slots: Vec<Slot<T>>,
    next_connection_id: u64,
}

impl<T> Registry<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::vacant()).collect(),
            next_connection_id: 0,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn counts(&self) -> SlotCounts {
        let mut counts = SlotCounts::default();
        for slot in &self.slots {
            match slot.state {
                SlotState::Vacant => counts.vacant += 1,
                SlotState::Idle => counts.idle += 1,
                SlotState::InUse => counts.in_use += 1,
                SlotState::Invalid => counts.invalid += 1,
            }
        }
        counts
    }

    #[cfg(test)]
    pub(crate) fn state(&self, slot: usize) -> Option<SlotState> {
        self.slots.get(slot).map(|s| s.state)
    }

    /// Reserve an idle slot, or a vacant one if none is idle.
    pub(crate) fn take_available(&mut self) -> Option<Grant<T>> {
        let index = self
            .slots
            .iter()
            .position(|s| s.state == SlotState::Idle)
            .or_else(|| self.slots.iter().position(|s| s.state == SlotState::Vacant))?;
        let slot = &mut self.slots[index];
        slot.state = SlotState::InUse;
        slot.generation += 1;
        slot.returning = false;
        slot.revoked = false;
        Some(Grant {
            slot: index,
            generation: slot.generation,
            conn: slot.conn.take(),
        })
    }

    /// Undo a grant that never reached a caller.
    pub(crate) fn restore(&mut self, grant: Grant<T>) {
        let slot = &mut self.slots[grant.slot];
        if slot.generation != grant.generation || slot.state != SlotState::InUse {
            return;
        }
        match grant.conn {
            Some(conn) => {
                slot.conn = Some(conn);
                slot.state = SlotState::Idle;
            }
            None => slot.clear(),
        }
    }

    /// Whether `(slot, generation)` still names the current lease.
    #[cfg(test)]
    pub(crate) fn is_current(&self, slot: usize, generation: u64) -> bool {
        self.slots
            .get(slot)
            .is_some_and(|s| s.state == SlotState::InUse && s.generation == generation)
    }

    pub(crate) fn last_validated(&self, slot: usize) -> Option<Instant> {
        self.slots.get(slot).and_then(|s| s.last_validated)
    }

    pub(crate) fn connection_id(&self, slot: usize) -> Option<ConnectionId> {
        self.slots.get(slot).and_then(|s| s.connection_id)
    }

    pub(crate) fn mark_validated(&mut self, slot: usize, at: Instant) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.last_validated = Some(at);
        }
    }

    /// Record a freshly opened connection for a slot the caller holds.
    pub(crate) fn install(&mut self, slot: usize, now: Instant) -> ConnectionId {
        let id = ConnectionId(self.next_connection_id);
        self.next_connection_id += 1;
        let s = &mut self.slots[slot];
        s.state = SlotState::InUse;
        s.connection_id = Some(id);
        s.created_at = Some(now);
        s.last_validated = Some(now);
        id
    }

    /// Begin returning a lease; rejects unknown, idle, stale or duplicate
    /// returns.
    pub(crate) fn begin_return(&mut self, slot: usize, generation: u64) -> Result<Returning, String> {
        let capacity = self.slots.len();
        let Some(s) = self.slots.get_mut(slot) else {
            return Err(format!("slot {slot} does not exist (capacity {capacity})"));
        };
        if s.state != SlotState::InUse {
            return Err(format!("slot {slot} is {:?}, not in use", s.state));
        }
        if s.generation != generation {
            return Err(format!(
                "lease generation {generation} is stale for slot {slot} (current {})",
                s.generation
            ));
        }
        if s.returning {
            return Err(format!("slot {slot} is already being returned"));
        }
        s.returning = true;
        Ok(Returning {
            connection_id: s.connection_id,
            created_at: s.created_at,
            revoked: s.revoked,
        })
    }

    /// Put a healthy connection back as idle.
    pub(crate) fn check_in(&mut self, slot: usize, conn: T, validated_at: Instant) {
        let s = &mut self.slots[slot];
        s.conn = Some(conn);
        s.state = SlotState::Idle;
        s.last_validated = Some(validated_at);
        s.returning = false;
        s.revoked = false;
    }

    /// Store a replacement connection as idle.
    pub(crate) fn fill(&mut self, slot: usize, conn: T, now: Instant) -> ConnectionId {
        let id = self.install(slot, now);
        self.check_in(slot, conn, now);
        id
    }

    pub(crate) fn mark_invalid(&mut self, slot: usize) {
        let s = &mut self.slots[slot];
        s.state = SlotState::Invalid;
        s.conn = None;
    }

    pub(crate) fn vacate(&mut self, slot: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.clear();
        }
    }

    /// Release a reservation held by `(slot, generation)` without a
    /// connection, if it is still current. Covers slots mid-retirement.
    pub(crate) fn vacate_lease(&mut self, slot: usize, generation: u64) -> bool {
        match self.slots.get_mut(slot) {
            Some(s)
                if s.generation == generation
                    && matches!(s.state, SlotState::InUse | SlotState::Invalid) =>
            {
                s.clear();
                true
            }
            _ => false,
        }
    }

    /// Fill a vacant slot during warm-up.
    pub(crate) fn fill_vacant(&mut self, conn: T, now: Instant) -> Result<(usize, ConnectionId), T> {
        match self.slots.iter().position(|s| s.state == SlotState::Vacant) {
            Some(index) => Ok((index, self.fill(index, conn, now))),
            None => Err(conn),
        }
    }

    /// Take every idle connection, leaving the slots vacant.
    pub(crate) fn drain_idle(&mut self) -> Vec<(ConnectionId, T)> {
        let mut drained = Vec::new();
        for s in &mut self.slots {
            if s.state == SlotState::Idle {
                if let (Some(conn), Some(id)) = (s.conn.take(), s.connection_id) {
                    drained.push((id, conn));
                }
                s.clear();
            }
        }
        drained
    }

    /// Revoke every outstanding lease; returns the revoked slots.
    pub(crate) fn revoke_in_use(&mut self) -> Vec<(usize, Option<ConnectionId>)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter(|(_, s)| s.state == SlotState::InUse && !s.revoked)
            .map(|(index, s)| {
                s.revoked = true;
                (index, s.connection_id)
            })
            .collect()
    }

    /// Slots still lent out or mid-retirement.
    pub(crate) fn outstanding(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| matches!(s.state, SlotState::InUse | SlotState::Invalid))
            .count()
    }
}
