//! Liveness probing for pooled connections.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::connector::Connector;
use crate::descriptor::ConnectionDescriptor;

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The connection answered and reported itself usable.
    Healthy,
    /// The connection answered but reported itself unusable.
    Rejected,
    /// The probe returned a driver error.
    Failed,
    /// The probe did not answer within the validation timeout.
    TimedOut,
}

impl Verdict {
    /// Whether the connection may be handed out again.
    #[must_use]
    pub fn is_usable(self) -> bool {
        matches!(self, Self::Healthy)
    }
}

/// Validates connections on hand-out and on return.
#[derive(Debug, Clone, Copy)]
pub struct HealthChecker {
    window: Duration,
    timeout: Duration,
}

impl HealthChecker {
    /// Create a checker with a freshness window and probe timeout.
    #[must_use]
    pub fn new(window: Duration, timeout: Duration) -> Self {
        Self { window, timeout }
    }

    /// Create a checker from a descriptor's validation settings.
    #[must_use]
    pub fn from_descriptor(descriptor: &ConnectionDescriptor) -> Self {
        Self::new(descriptor.validation_window, descriptor.validation_timeout)
    }

    /// Whether a connection validated at `last_validated` can skip the
    /// hand-out probe.
    #[must_use]
    pub fn is_fresh(&self, last_validated: Option<Instant>) -> bool {
        !self.window.is_zero()
            && last_validated.is_some_and(|at| at.elapsed() < self.window)
    }

    /// Probe a connection.
    ///
    /// The returned future holds only the connector's probe future, so it
    /// stays `Send` even when the connection type is not `Sync`.
    pub fn probe<'a, C: Connector>(
        self,
        connector: &'a C,
        conn: &'a C::Connection,
    ) -> impl Future<Output = Verdict> + Send + 'a {
        let timeout = self.timeout;
        let check = connector.is_valid(conn);
        async move {
            match tokio::time::timeout(timeout, check).await {
                Ok(Ok(true)) => Verdict::Healthy,
                Ok(Ok(false)) => Verdict::Rejected,
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "liveness probe failed");
                    Verdict::Failed
                }
                Err(_) => {
                    tracing::debug!(
                        timeout_ms = timeout.as_millis() as u64,
                        "liveness probe timed out"
                    );
                    Verdict::TimedOut
                }
            }
        }
    }

    /// Probe a connection and collapse the verdict to a boolean.
    pub fn validate<'a, C: Connector>(
        self,
        connector: &'a C,
        conn: &'a C::Connection,
    ) -> impl Future<Output = bool> + Send + 'a {
        let probe = self.probe(connector, conn);
        async move { probe.await.is_usable() }
    }
}
