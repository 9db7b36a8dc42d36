//! RAII guard for lent connections

use tokio::time::Instant;
use uuid::Uuid;

use super::Pool;
use crate::connector::Connector;
use crate::registry::ConnectionId;

/// Token naming one checkout of one slot.
///
/// Detached connections are returned with [`Pool::check_in`] by presenting
/// their lease. A lease is good for exactly one return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lease {
    /// Pool that issued the lease.
    pub pool: Uuid,
    /// Slot index inside that pool.
    pub slot: usize,
    /// Checkout counter of the slot at the time of issue.
    pub generation: u64,
}

/// A connection lent by a [`Pool`].
///
/// Dropping the guard returns the connection to the pool on a background
/// task. Use [`Pool::release`] to return it and observe the outcome, or
/// [`detach`](Self::detach) to take manual responsibility for returning it.
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    lease: Lease,
    connection_id: ConnectionId,
    acquired_at: Instant,
    pool: Pool<C>,
}

impl<C: Connector> PooledConnection<C> {
    pub(super) fn new(
        conn: C::Connection,
        lease: Lease,
        connection_id: ConnectionId,
        pool: Pool<C>,
    ) -> Self {
        Self {
            conn: Some(conn),
            lease,
            connection_id,
            acquired_at: Instant::now(),
            pool,
        }
    }

    /// The lease this guard holds.
    #[must_use]
    pub fn lease(&self) -> Lease {
        self.lease
    }

    /// Identifier of the physical connection.
    #[must_use]
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// When the connection was handed out.
    #[must_use]
    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// Take the connection out of the guard without returning it.
    ///
    /// The slot stays in use until the connection is handed back with
    /// [`Pool::check_in`] using the returned lease.
    #[must_use]
    pub fn detach(mut self) -> (Lease, C::Connection) {
        let conn = self.conn.take().expect("guard used after detach");
        (self.lease, conn)
    }

    pub(super) fn into_parts(mut self) -> (Lease, C::Connection, Instant) {
        let conn = self.conn.take().expect("guard used after detach");
        (self.lease, conn, self.acquired_at)
    }
}

impl<C: Connector> std::ops::Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &C::Connection {
        self.conn.as_ref().expect("guard used after detach")
    }
}

impl<C: Connector> std::ops::DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut C::Connection {
        self.conn.as_mut().expect("guard used after detach")
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.return_on_drop(self.lease, conn, self.acquired_at);
        }
    }
}

impl<C: Connector> std::fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("lease", &self.lease)
            .field("connection_id", &self.connection_id)
            .field("attached", &self.conn.is_some())
            .finish()
    }
}
