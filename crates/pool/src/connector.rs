//! The backing-store driver seam.
//!
//! [`Connector`] is what applications implement for their store. The pool
//! only ever opens, probes and closes connections through it and never
//! interprets what flows over them.

use std::future::Future;
use std::sync::Arc;

use crate::descriptor::ConnectionDescriptor;
use crate::error::{ConnectError, PoolError, PoolResult};

/// Opens, probes and closes physical connections to a backing store.
pub trait Connector: Send + Sync + 'static {
    /// The physical connection type handed to callers.
    type Connection: Send + 'static;

    /// Driver error returned by `open` and `is_valid`.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open one physical connection. Must not retry internally.
    fn open(
        &self,
        descriptor: &ConnectionDescriptor,
    ) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Close a connection. Must tolerate a connection that is already closed.
    fn close(&self, conn: Self::Connection) -> impl Future<Output = ()> + Send {
        drop(conn);
        async {}
    }

    /// Cheap liveness probe, e.g. a no-op round trip.
    fn is_valid(
        &self,
        _conn: &Self::Connection,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        async { Ok(true) }
    }
}

/// Wraps a [`Connector`] with the descriptor's retry policy.
pub(crate) struct Factory<C: Connector> {
    connector: Arc<C>,
    descriptor: Arc<ConnectionDescriptor>,
}

impl<C: Connector> Factory<C> {
    pub(crate) fn new(connector: Arc<C>, descriptor: Arc<ConnectionDescriptor>) -> Self {
        Self {
            connector,
            descriptor,
        }
    }

    pub(crate) fn connector(&self) -> &C {
        &self.connector
    }

    /// Open a connection, retrying with backoff up to the configured number
    /// of attempts.
    pub(crate) async fn create(&self) -> PoolResult<C::Connection> {
        let retry = self.descriptor.connect_retry;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.connector.open(&self.descriptor).await {
                Ok(conn) => return Ok(conn),
                Err(e) if attempt < retry.max_attempts => {
                    let delay = retry.delay_after(attempt);
                    tracing::warn!(
                        endpoint = %self.descriptor.endpoint,
                        attempt,
                        max_attempts = retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(PoolError::Connection {
                        endpoint: self.descriptor.endpoint.clone(),
                        attempts: attempt,
                        source: Arc::new(ConnectError::new(e)),
                    });
                }
            }
        }
    }

    /// Close a connection through the connector.
    pub(crate) async fn destroy(&self, conn: C::Connection) {
        self.connector.close(conn).await;
    }
}
