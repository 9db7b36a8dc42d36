//! In-memory connector shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sluice_pool::{ConnectionDescriptor, Connector, Credentials};

#[derive(Debug, thiserror::Error)]
pub enum MemError {
    #[error("connection refused")]
    Refused,
}

/// A fake physical connection.
#[derive(Debug, PartialEq, Eq)]
pub struct MemConn {
    pub id: u64,
}

/// Knobs and counters shared between a test and its connector.
#[derive(Debug, Default)]
pub struct MemState {
    pub opened: AtomicU64,
    pub closed: AtomicU64,
    pub probes: AtomicU64,
    /// Refuse every open while set.
    pub refuse: AtomicBool,
    /// Refuse this many upcoming opens.
    pub fail_next: AtomicU32,
    /// Delay applied to every open, in milliseconds.
    pub open_delay_ms: AtomicU64,
    /// Delay applied to every liveness probe, in milliseconds.
    pub probe_delay_ms: AtomicU64,
    fail_after: Mutex<Option<u64>>,
    broken: Mutex<HashSet<u64>>,
}

impl MemState {
    pub fn opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> u64 {
        self.probes.load(Ordering::SeqCst)
    }

    /// Make the liveness probe fail for connection `id`.
    pub fn break_conn(&self, id: u64) {
        self.broken.lock().unwrap().insert(id);
    }

    /// Refuse opens once `n` connections have been opened; `None` lifts it.
    pub fn fail_after(&self, n: Option<u64>) {
        *self.fail_after.lock().unwrap() = n;
    }

    pub fn refuse_opens(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

pub struct MemConnector {
    state: Arc<MemState>,
}

impl Connector for MemConnector {
    type Connection = MemConn;
    type Error = MemError;

    async fn open(&self, _descriptor: &ConnectionDescriptor) -> Result<MemConn, MemError> {
        let delay = self.state.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.refuse.load(Ordering::SeqCst) {
            return Err(MemError::Refused);
        }
        let limit = *self.state.fail_after.lock().unwrap();
        if limit.is_some_and(|n| self.state.opened() >= n) {
            return Err(MemError::Refused);
        }
        if self
            .state
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(MemError::Refused);
        }
        let id = self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(MemConn { id })
    }

    async fn close(&self, _conn: MemConn) {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
    }

    async fn is_valid(&self, conn: &MemConn) -> Result<bool, MemError> {
        self.state.probes.fetch_add(1, Ordering::SeqCst);
        let delay = self.state.probe_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        Ok(!self.state.broken.lock().unwrap().contains(&conn.id))
    }
}

pub fn connector() -> (MemConnector, Arc<MemState>) {
    let state = Arc::new(MemState::default());
    (
        MemConnector {
            state: Arc::clone(&state),
        },
        state,
    )
}

pub fn descriptor(capacity: usize) -> ConnectionDescriptor {
    ConnectionDescriptor::new("mem://primary", Credentials::new("app", "hunter2"), capacity)
}
