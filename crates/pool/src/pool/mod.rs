//! The pool controller.
//!
//! All bookkeeping lives behind one lock: the slot registry, the wait queue,
//! the counters. The lock is never held across an `.await`. Opening, probing
//! and closing connections happen outside it, on a slot the caller has
//! already reserved.

mod guard;
mod stats;

pub use guard::{Lease, PooledConnection};
pub use stats::{PoolStats, ShutdownReport};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Notify, broadcast, oneshot};
use tokio::time::Instant;
use uuid::Uuid;

use crate::connector::{Connector, Factory};
use crate::descriptor::{ConnectionDescriptor, Warmup};
use crate::error::{ConnectError, PoolError, PoolResult};
use crate::events::{EventBus, PoolEvent, RetireReason};
use crate::health::HealthChecker;
use crate::queue::WaitQueue;
use crate::registry::{ConnectionId, Grant, Registry};

/// Deadline used when `now + timeout` overflows.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn deadline_after(from: Instant, timeout: Duration) -> Instant {
    from.checked_add(timeout).unwrap_or_else(|| from + FAR_FUTURE)
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct State<T> {
    registry: Registry<T>,
    waiters: WaitQueue<T>,
    closed: bool,
    initialized: bool,
    created: u64,
    destroyed: u64,
    total_acquisitions: u64,
    total_releases: u64,
    timeouts: u64,
    /// Most recent connect failure; attached to timeouts as their cause.
    last_connect_error: Option<Arc<ConnectError>>,
}

impl<T> State<T> {
    fn new(capacity: usize) -> Self {
        Self {
            registry: Registry::new(capacity),
            waiters: WaitQueue::new(),
            closed: false,
            initialized: false,
            created: 0,
            destroyed: 0,
            total_acquisitions: 0,
            total_releases: 0,
            timeouts: 0,
            last_connect_error: None,
        }
    }

    /// Hand available slots to queued callers, oldest first.
    fn dispatch(&mut self) {
        while !self.waiters.is_empty() {
            let Some(grant) = self.registry.take_available() else {
                break;
            };
            if let Err(grant) = self.waiters.hand_off(grant) {
                self.registry.restore(grant);
                break;
            }
        }
    }

    /// Put back a grant whose caller went away.
    ///
    /// Returns the connection when the pool is already closed and it must be
    /// closed instead of going back to idle.
    fn take_back(&mut self, grant: Grant<T>) -> Option<T> {
        if self.closed {
            self.registry.vacate_lease(grant.slot, grant.generation);
            if grant.conn.is_some() {
                self.destroyed += 1;
            }
            grant.conn
        } else {
            self.registry.restore(grant);
            self.dispatch();
            None
        }
    }

    fn record_connect_error(&mut self, error: &PoolError) {
        if let PoolError::Connection { source, .. } = error {
            self.last_connect_error = Some(Arc::clone(source));
        }
    }
}

struct Inner<C: Connector> {
    id: Uuid,
    descriptor: Arc<ConnectionDescriptor>,
    factory: Factory<C>,
    health: HealthChecker,
    state: Mutex<State<C::Connection>>,
    /// Signalled whenever an outstanding lease comes back during shutdown.
    drained: Notify,
    events: EventBus,
}

impl<C: Connector> Inner<C> {
    /// Close a connection from a synchronous context.
    fn close_detached(self: &Arc<Self>, conn: C::Connection) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                drop(handle.spawn(async move {
                    inner.factory.destroy(conn).await;
                }));
            }
            Err(_) => drop(conn),
        }
    }
}

// ---------------------------------------------------------------------------
// Cancellation guards
// ---------------------------------------------------------------------------

/// A queued caller. Dropping it before it settles leaves the queue and
/// passes on any grant that was staged for it in the meantime.
struct Waiting<C: Connector> {
    inner: Arc<Inner<C>>,
    ticket: u64,
    rx: oneshot::Receiver<Grant<C::Connection>>,
    settled: bool,
}

impl<C: Connector> Waiting<C> {
    /// Leave the queue.
    fn abandon(&mut self) {
        self.settled = true;
        let orphan = {
            let mut state = self.inner.state.lock();
            if state.waiters.remove(self.ticket) {
                None
            } else {
                self.rx.try_recv().ok().and_then(|grant| state.take_back(grant))
            }
        };
        if let Some(conn) = orphan {
            self.inner.close_detached(conn);
            self.inner.drained.notify_one();
        }
    }
}

impl<C: Connector> Drop for Waiting<C> {
    fn drop(&mut self) {
        if !self.settled {
            self.abandon();
        }
    }
}

/// A slot reserved for a caller whose connection is still being prepared.
/// Dropping it while armed frees the slot.
struct Reservation<'a, C: Connector> {
    inner: &'a Inner<C>,
    slot: usize,
    generation: u64,
    armed: bool,
}

impl<C: Connector> Drop for Reservation<'_, C> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut state = self.inner.state.lock();
            if state.registry.vacate_lease(self.slot, self.generation) {
                state.dispatch();
            }
        }
        self.inner.drained.notify_one();
    }
}

enum Admission<T> {
    Granted(Grant<T>),
    Queued(u64, oneshot::Receiver<Grant<T>>),
}

// ---------------------------------------------------------------------------
// Pool<C>
// ---------------------------------------------------------------------------

/// Bounded pool of connections produced by a [`Connector`].
///
/// Cloning is cheap and every clone refers to the same pool.
pub struct Pool<C: Connector> {
    inner: Arc<Inner<C>>,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.descriptor.endpoint)
            .field("stats", &self.stats())
            .finish()
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool. No connection is opened until [`initialize`](Self::initialize)
    /// or the first [`acquire`](Self::acquire).
    ///
    /// # Errors
    /// Returns `Configuration` if the descriptor is invalid.
    pub fn new(connector: C, descriptor: ConnectionDescriptor) -> PoolResult<Self> {
        descriptor.validate()?;
        let capacity = descriptor.capacity;
        let descriptor = Arc::new(descriptor);
        let health = HealthChecker::from_descriptor(&descriptor);
        let id = Uuid::new_v4();
        tracing::debug!(
            pool_id = %id,
            endpoint = %descriptor.endpoint,
            capacity,
            "pool created"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                id,
                factory: Factory::new(Arc::new(connector), Arc::clone(&descriptor)),
                descriptor,
                health,
                state: Mutex::new(State::new(capacity)),
                drained: Notify::new(),
                events: EventBus::default(),
            }),
        })
    }

    /// Create a pool and run [`initialize`](Self::initialize) on it.
    ///
    /// # Errors
    /// Returns `Configuration` for an invalid descriptor, or the first
    /// connect failure when warm-up is eager.
    pub async fn connect(connector: C, descriptor: ConnectionDescriptor) -> PoolResult<Self> {
        let pool = Self::new(connector, descriptor)?;
        pool.initialize().await?;
        Ok(pool)
    }

    /// Prepare the pool for use.
    ///
    /// With [`Warmup::Eager`] every vacant slot is filled now. If any open
    /// fails, the connections opened by this call are closed and the error
    /// is returned; a later call may try again. With [`Warmup::Lazy`] this
    /// only marks the pool as initialized. Calling it again is a no-op.
    ///
    /// # Errors
    /// Returns `PoolClosed` after shutdown, or `Connection` when an eager
    /// open fails.
    pub async fn initialize(&self) -> PoolResult<()> {
        let inner = &self.inner;
        let vacant = {
            let mut state = inner.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            if state.initialized {
                return Ok(());
            }
            state.initialized = true;
            state.registry.counts().vacant
        };

        if inner.descriptor.warmup == Warmup::Lazy {
            tracing::debug!(pool_id = %inner.id, "lazy warm-up; connections open on demand");
            return Ok(());
        }

        let mut opened = Vec::with_capacity(vacant);
        for _ in 0..vacant {
            match inner.factory.create().await {
                Ok(conn) => opened.push(conn),
                Err(e) => {
                    tracing::warn!(
                        pool_id = %inner.id,
                        opened = opened.len(),
                        error = %e,
                        "eager warm-up failed; closing partial connections"
                    );
                    for conn in opened {
                        inner.factory.destroy(conn).await;
                    }
                    {
                        let mut state = inner.state.lock();
                        state.initialized = false;
                        state.record_connect_error(&e);
                    }
                    return Err(e);
                }
            }
        }

        let leftovers = {
            let mut state = inner.state.lock();
            let now = Instant::now();
            let mut leftovers = Vec::new();
            for conn in opened {
                if state.closed {
                    leftovers.push(conn);
                    continue;
                }
                match state.registry.fill_vacant(conn, now) {
                    Ok((slot, connection)) => {
                        state.created += 1;
                        inner.events.emit(PoolEvent::Created { connection, slot });
                    }
                    Err(conn) => leftovers.push(conn),
                }
            }
            state.dispatch();
            leftovers
        };
        for conn in leftovers {
            inner.factory.destroy(conn).await;
        }

        tracing::info!(pool_id = %inner.id, "eager warm-up complete");
        Ok(())
    }

    /// Acquire a connection using the descriptor's `acquire_timeout`.
    ///
    /// # Errors
    /// See [`acquire`](Self::acquire).
    pub async fn acquire_default(&self) -> PoolResult<PooledConnection<C>> {
        self.acquire(self.inner.descriptor.acquire_timeout).await
    }

    /// Acquire a connection, waiting up to `timeout` for a free slot.
    ///
    /// Callers are served strictly in arrival order. The deadline covers the
    /// whole call: queueing for a slot, opening a connection for it and the
    /// hand-out probe. An open or probe still running at the deadline is
    /// abandoned and the slot goes to the next caller.
    ///
    /// # Errors
    /// - `AcquireTimeout` if no slot frees up in time.
    /// - `Connection` if a new connection was needed and could not be opened.
    /// - `PoolClosed` if the pool is shut down before or during the wait.
    pub async fn acquire(&self, timeout: Duration) -> PoolResult<PooledConnection<C>> {
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        let admission = {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(PoolError::PoolClosed);
            }
            // Queued callers go first; a newcomer may not overtake them.
            let granted = if state.waiters.is_empty() {
                state.registry.take_available()
            } else {
                None
            };
            match granted {
                Some(grant) => Admission::Granted(grant),
                None => {
                    let (ticket, rx) = state.waiters.push();
                    Admission::Queued(ticket, rx)
                }
            }
        };

        let grant = match admission {
            Admission::Granted(grant) => grant,
            Admission::Queued(ticket, rx) => self.wait(ticket, rx, deadline, timeout).await?,
        };
        self.prepare(grant, started, deadline, timeout).await
    }

    /// Count an acquisition that ran out of time and build its error.
    ///
    /// The most recent connect failure, if any, becomes the error's source.
    fn timed_out(&self, timeout: Duration) -> PoolError {
        let (waiters, source) = {
            let mut state = self.inner.state.lock();
            state.timeouts += 1;
            (state.waiters.len(), state.last_connect_error.clone())
        };
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(
            pool_id = %self.inner.id,
            timeout_ms,
            waiters,
            "acquire timed out"
        );
        self.inner.events.emit(PoolEvent::Timeout { waiters });
        PoolError::AcquireTimeout {
            timeout_ms,
            waiters,
            source,
        }
    }

    async fn wait(
        &self,
        ticket: u64,
        rx: oneshot::Receiver<Grant<C::Connection>>,
        deadline: Instant,
        timeout: Duration,
    ) -> PoolResult<Grant<C::Connection>> {
        let mut waiting = Waiting {
            inner: Arc::clone(&self.inner),
            ticket,
            rx,
            settled: false,
        };
        let outcome = tokio::time::timeout_at(deadline, &mut waiting.rx).await;
        match outcome {
            Ok(Ok(grant)) => {
                waiting.settled = true;
                Ok(grant)
            }
            Ok(Err(_)) => {
                waiting.settled = true;
                Err(PoolError::PoolClosed)
            }
            Err(_) => {
                waiting.abandon();
                Err(self.timed_out(timeout))
            }
        }
    }

    /// Turn a reserved slot into a usable connection for the caller.
    ///
    /// Opening and probing stop at `deadline`; the reservation then frees
    /// the slot for the next caller.
    async fn prepare(
        &self,
        grant: Grant<C::Connection>,
        started: Instant,
        deadline: Instant,
        timeout: Duration,
    ) -> PoolResult<PooledConnection<C>> {
        let inner = &*self.inner;
        let Grant {
            slot,
            generation,
            conn,
        } = grant;
        let mut reservation = Reservation {
            inner,
            slot,
            generation,
            armed: true,
        };

        let (conn, connection) = match conn {
            Some(conn) => {
                let (last_validated, connection) = {
                    let state = inner.state.lock();
                    (
                        state.registry.last_validated(slot),
                        state.registry.connection_id(slot),
                    )
                };
                let connection = connection.unwrap_or(ConnectionId(u64::MAX));
                let fresh = inner.health.is_fresh(last_validated);
                let verdict = if fresh {
                    Ok(true)
                } else {
                    tokio::time::timeout_at(
                        deadline,
                        inner.health.validate(inner.factory.connector(), &conn),
                    )
                    .await
                };
                match verdict {
                    Ok(true) => {
                        if !fresh {
                            inner.state.lock().registry.mark_validated(slot, Instant::now());
                        }
                        (conn, connection)
                    }
                    Ok(false) => {
                        self.retire(slot, connection, conn, RetireReason::FailedOnAcquire)
                            .await;
                        self.open_until(slot, generation, deadline, timeout).await?
                    }
                    Err(_) => {
                        // The probe outlasted the caller; the connection is
                        // not trusted for the next one either.
                        self.retire_detached(slot, connection, conn, RetireReason::FailedOnAcquire);
                        drop(reservation);
                        return Err(self.timed_out(timeout));
                    }
                }
            }
            None => self.open_until(slot, generation, deadline, timeout).await?,
        };

        let closed = {
            let mut state = inner.state.lock();
            if state.closed {
                state.registry.vacate_lease(slot, generation);
                state.destroyed += 1;
                true
            } else {
                state.total_acquisitions += 1;
                false
            }
        };
        reservation.armed = false;
        drop(reservation);

        if closed {
            inner.factory.destroy(conn).await;
            inner.drained.notify_one();
            inner.events.emit(PoolEvent::Retired {
                connection,
                reason: RetireReason::Shutdown,
            });
            return Err(PoolError::PoolClosed);
        }

        let wait = started.elapsed();
        tracing::debug!(
            pool_id = %inner.id,
            slot,
            connection = %connection,
            wait_ms = wait.as_millis() as u64,
            "connection acquired"
        );
        inner.events.emit(PoolEvent::Acquired { connection, wait });
        Ok(PooledConnection::new(
            conn,
            Lease {
                pool: inner.id,
                slot,
                generation,
            },
            connection,
            self.clone(),
        ))
    }

    /// [`open_for`](Self::open_for), giving up at `deadline`.
    ///
    /// An abandoned open leaves the slot to the caller's reservation, which
    /// vacates it on drop.
    async fn open_until(
        &self,
        slot: usize,
        generation: u64,
        deadline: Instant,
        timeout: Duration,
    ) -> PoolResult<(C::Connection, ConnectionId)> {
        match tokio::time::timeout_at(deadline, self.open_for(slot, generation)).await {
            Ok(opened) => opened,
            Err(_) => {
                tracing::debug!(pool_id = %self.inner.id, slot, "open abandoned at acquire deadline");
                Err(self.timed_out(timeout))
            }
        }
    }

    /// Open a connection for a slot the caller holds.
    ///
    /// On failure the slot is vacated and offered to the next waiter.
    async fn open_for(
        &self,
        slot: usize,
        generation: u64,
    ) -> PoolResult<(C::Connection, ConnectionId)> {
        let inner = &*self.inner;
        match inner.factory.create().await {
            Ok(conn) => {
                let connection = {
                    let mut state = inner.state.lock();
                    state.created += 1;
                    state.last_connect_error = None;
                    state.registry.install(slot, Instant::now())
                };
                tracing::debug!(pool_id = %inner.id, slot, connection = %connection, "connection opened");
                inner.events.emit(PoolEvent::Created { connection, slot });
                Ok((conn, connection))
            }
            Err(e) => {
                {
                    let mut state = inner.state.lock();
                    state.registry.vacate_lease(slot, generation);
                    state.record_connect_error(&e);
                    state.dispatch();
                }
                inner.drained.notify_one();
                tracing::warn!(pool_id = %inner.id, slot, error = %e, "failed to open connection");
                inner.events.emit(PoolEvent::ConnectFailed {
                    slot,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Close a connection that failed validation; its slot stays `Invalid`
    /// until a replacement is installed or the slot is vacated.
    async fn retire(
        &self,
        slot: usize,
        connection: ConnectionId,
        conn: C::Connection,
        reason: RetireReason,
    ) {
        let inner = &*self.inner;
        inner.state.lock().registry.mark_invalid(slot);
        inner.factory.destroy(conn).await;
        inner.state.lock().destroyed += 1;
        tracing::debug!(
            pool_id = %inner.id,
            slot,
            connection = %connection,
            ?reason,
            "connection retired"
        );
        inner.events.emit(PoolEvent::Retired { connection, reason });
    }

    /// Like [`retire`](Self::retire), closing the connection on a background
    /// task so the caller does not wait for it.
    fn retire_detached(
        &self,
        slot: usize,
        connection: ConnectionId,
        conn: C::Connection,
        reason: RetireReason,
    ) {
        {
            let mut state = self.inner.state.lock();
            state.registry.mark_invalid(slot);
            state.destroyed += 1;
        }
        self.inner.close_detached(conn);
        tracing::debug!(
            pool_id = %self.inner.id,
            slot,
            connection = %connection,
            ?reason,
            "connection retired in the background"
        );
        self.inner.events.emit(PoolEvent::Retired { connection, reason });
    }

    /// Open a replacement for a retired connection and park it as idle.
    async fn replace(&self, slot: usize) {
        let inner = &*self.inner;
        match inner.factory.create().await {
            Ok(conn) => {
                let stored = {
                    let mut state = inner.state.lock();
                    if state.closed {
                        state.registry.vacate(slot);
                        Err(conn)
                    } else {
                        let connection = state.registry.fill(slot, conn, Instant::now());
                        state.created += 1;
                        state.last_connect_error = None;
                        state.dispatch();
                        Ok(connection)
                    }
                };
                match stored {
                    Ok(connection) => {
                        tracing::debug!(pool_id = %inner.id, slot, connection = %connection, "replacement opened");
                        inner.events.emit(PoolEvent::Created { connection, slot });
                    }
                    Err(conn) => {
                        inner.factory.destroy(conn).await;
                        inner.drained.notify_one();
                    }
                }
            }
            Err(e) => {
                {
                    let mut state = inner.state.lock();
                    state.registry.vacate(slot);
                    state.record_connect_error(&e);
                    state.dispatch();
                }
                inner.drained.notify_one();
                tracing::warn!(
                    pool_id = %inner.id,
                    slot,
                    error = %e,
                    "could not replace retired connection; slot left vacant"
                );
                inner.events.emit(PoolEvent::ConnectFailed {
                    slot,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Return a connection to the pool.
    ///
    /// The connection is probed; a healthy one goes back to idle and is
    /// handed to the oldest waiter, an unhealthy or expired one is closed
    /// and replaced. After shutdown the connection is closed.
    ///
    /// # Errors
    /// Returns `InvalidRelease` if the guard was issued by another pool; the
    /// guard then returns to its own pool on drop.
    pub async fn release(&self, conn: PooledConnection<C>) -> PoolResult<()> {
        let lease = conn.lease();
        if lease.pool != self.inner.id {
            return Err(PoolError::invalid_release(format!(
                "connection was issued by pool {}, not {}",
                lease.pool, self.inner.id
            )));
        }
        let (lease, conn, acquired_at) = conn.into_parts();
        self.reclaim(lease, conn, Some(acquired_at)).await
    }

    /// Return a connection taken out with [`PooledConnection::detach`].
    ///
    /// # Errors
    /// Returns `InvalidRelease` if the lease is foreign, names no slot, or
    /// was already returned. The connection is closed in that case.
    pub async fn check_in(&self, lease: Lease, conn: C::Connection) -> PoolResult<()> {
        if lease.pool != self.inner.id {
            self.inner.factory.destroy(conn).await;
            return Err(PoolError::invalid_release(format!(
                "lease was issued by pool {}, not {}",
                lease.pool, self.inner.id
            )));
        }
        self.reclaim(lease, conn, None).await
    }

    async fn reclaim(
        &self,
        lease: Lease,
        conn: C::Connection,
        acquired_at: Option<Instant>,
    ) -> PoolResult<()> {
        let inner = &*self.inner;
        let slot = lease.slot;
        let begun = {
            let mut state = inner.state.lock();
            state
                .registry
                .begin_return(slot, lease.generation)
                .map(|returning| (returning, state.closed))
        };
        let (returning, closed) = match begun {
            Ok(begun) => begun,
            Err(reason) => {
                tracing::warn!(pool_id = %inner.id, slot, %reason, "rejected release");
                inner.factory.destroy(conn).await;
                return Err(PoolError::invalid_release(reason));
            }
        };
        let connection = returning
            .connection_id
            .unwrap_or(ConnectionId(u64::MAX));

        if returning.revoked || closed {
            inner.factory.destroy(conn).await;
            {
                let mut state = inner.state.lock();
                state.registry.vacate(slot);
                state.destroyed += 1;
                state.total_releases += 1;
            }
            inner.drained.notify_one();
            let reason = if returning.revoked {
                RetireReason::Revoked
            } else {
                RetireReason::Shutdown
            };
            tracing::debug!(pool_id = %inner.id, slot, connection = %connection, ?reason, "closed returned connection");
            inner.events.emit(PoolEvent::Retired { connection, reason });
            return Ok(());
        }

        let expired = inner
            .descriptor
            .max_lifetime
            .zip(returning.created_at)
            .is_some_and(|(max, created)| created.elapsed() >= max);
        let healthy = !expired && inner.health.validate(inner.factory.connector(), &conn).await;

        if healthy {
            let parked = {
                let mut state = inner.state.lock();
                state.total_releases += 1;
                if state.closed {
                    state.registry.vacate(slot);
                    state.destroyed += 1;
                    Some(conn)
                } else {
                    state.registry.check_in(slot, conn, Instant::now());
                    state.dispatch();
                    None
                }
            };
            match parked {
                None => {
                    let held = acquired_at.map(|at| at.elapsed()).unwrap_or_default();
                    tracing::debug!(pool_id = %inner.id, slot, connection = %connection, "connection released");
                    inner.events.emit(PoolEvent::Released { connection, held });
                }
                Some(conn) => {
                    inner.factory.destroy(conn).await;
                    inner.drained.notify_one();
                    inner.events.emit(PoolEvent::Retired {
                        connection,
                        reason: RetireReason::Shutdown,
                    });
                }
            }
            return Ok(());
        }

        let reason = if expired {
            RetireReason::Expired
        } else {
            RetireReason::FailedOnRelease
        };
        inner.state.lock().total_releases += 1;
        self.retire(slot, connection, conn, reason).await;
        self.replace(slot).await;
        Ok(())
    }

    /// Called from the guard's `Drop`.
    pub(crate) fn return_on_drop(&self, lease: Lease, conn: C::Connection, acquired_at: Instant) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = self.clone();
                drop(handle.spawn(async move {
                    if let Err(e) = pool.reclaim(lease, conn, Some(acquired_at)).await {
                        tracing::warn!(pool_id = %pool.inner.id, error = %e, "background release failed");
                    }
                }));
            }
            Err(_) => {
                // Without a runtime the connection can be neither probed nor
                // closed through the connector; free the slot and drop it.
                {
                    let mut state = self.inner.state.lock();
                    if state.registry.begin_return(lease.slot, lease.generation).is_ok() {
                        state.registry.vacate(lease.slot);
                        state.destroyed += 1;
                        state.total_releases += 1;
                        state.dispatch();
                    }
                }
                self.inner.drained.notify_one();
                tracing::warn!(
                    pool_id = %self.inner.id,
                    slot = lease.slot,
                    "connection dropped outside a runtime; closed without the connector"
                );
                drop(conn);
            }
        }
    }

    /// Stop the pool.
    ///
    /// New acquisitions fail with `PoolClosed` from now on and queued
    /// callers are woken with it. Idle connections are closed immediately.
    /// Outstanding leases get `drain_timeout` to come back; any still out at
    /// the deadline are revoked and their connections are closed whenever
    /// they are returned. A revoked connection that is never returned (a
    /// detached one that is never checked in, say) is never passed to
    /// [`Connector::close`]; `force_closed` counts revocations, not closes.
    /// Calling this again reports `already_closed`.
    ///
    /// # Errors
    /// Currently infallible; the `Result` leaves room for connector-level
    /// shutdown failures.
    pub async fn shutdown(&self, drain_timeout: Duration) -> PoolResult<ShutdownReport> {
        let inner = &*self.inner;
        let (idle, woken_waiters) = {
            let mut state = inner.state.lock();
            if state.closed {
                return Ok(ShutdownReport {
                    already_closed: true,
                    ..ShutdownReport::default()
                });
            }
            state.closed = true;
            (state.registry.drain_idle(), state.waiters.close())
        };
        tracing::info!(
            pool_id = %inner.id,
            idle = idle.len(),
            woken_waiters,
            drain_ms = drain_timeout.as_millis() as u64,
            "pool shutting down"
        );
        inner.events.emit(PoolEvent::ShutdownStarted);

        let closed_idle = idle.len();
        for (connection, conn) in idle {
            inner.factory.destroy(conn).await;
            inner.events.emit(PoolEvent::Retired {
                connection,
                reason: RetireReason::Shutdown,
            });
        }
        let outstanding_at_start = {
            let mut state = inner.state.lock();
            state.destroyed += closed_idle as u64;
            state.registry.outstanding()
        };

        let deadline = deadline_after(Instant::now(), drain_timeout);
        loop {
            let notified = inner.drained.notified();
            if inner.state.lock().registry.outstanding() == 0 {
                break;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        let (revoked, remaining) = {
            let mut state = inner.state.lock();
            (state.registry.revoke_in_use(), state.registry.outstanding())
        };
        for (slot, connection) in &revoked {
            tracing::warn!(
                pool_id = %inner.id,
                slot,
                connection = ?connection,
                "lease outstanding at drain deadline; force-closing on return"
            );
        }
        let force_closed = revoked.len();
        inner.events.emit(PoolEvent::ShutdownFinished { force_closed });
        tracing::info!(pool_id = %inner.id, force_closed, "pool shut down");

        Ok(ShutdownReport {
            already_closed: false,
            closed_idle,
            woken_waiters,
            drained: outstanding_at_start.saturating_sub(remaining),
            force_closed,
        })
    }

    /// Snapshot of the pool's counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        PoolStats {
            capacity: state.registry.capacity(),
            slots: state.registry.counts(),
            waiters: state.waiters.len(),
            created: state.created,
            destroyed: state.destroyed,
            total_acquisitions: state.total_acquisitions,
            total_releases: state.total_releases,
            timeouts: state.timeouts,
            closed: state.closed,
        }
    }

    /// The descriptor the pool was built from.
    #[must_use]
    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.inner.descriptor
    }

    /// Unique identifier of this pool; stamped on every lease.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// Subscribe to lifecycle events emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.inner.events.subscribe()
    }
}
