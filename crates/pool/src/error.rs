//! Error types for connection pooling
use std::sync::Arc;

use thiserror::Error;

/// Result type for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Failure reported by a [`Connector`](crate::Connector) while opening a
/// connection.
///
/// Wraps the driver's own error so the pool can keep it around (behind an
/// `Arc`) and attach it to later timeouts.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct ConnectError {
    #[source]
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl ConnectError {
    /// Wrap a driver error.
    pub fn new<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self {
            source: Box::new(source),
        }
    }

    /// The underlying driver error.
    #[must_use]
    pub fn inner(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self.source.as_ref()
    }
}

/// Errors surfaced by [`Pool`](crate::Pool) operations
#[derive(Error, Debug)]
pub enum PoolError {
    /// The connection descriptor is invalid. Fatal at construction.
    #[error("Configuration error: {message}")]
    Configuration {
        /// What is wrong with the descriptor
        message: String,
    },

    /// The backing store could not be reached while opening a connection.
    #[error("Failed to connect to '{endpoint}' after {attempts} attempt(s): {source}")]
    Connection {
        /// Endpoint that was dialled
        endpoint: String,
        /// Number of attempts made under the retry policy
        attempts: u32,
        /// The last driver error
        #[source]
        source: Arc<ConnectError>,
    },

    /// No connection became available before the deadline.
    #[error("Timed out after {timeout_ms}ms waiting for a connection ({waiters} waiter(s) queued)")]
    AcquireTimeout {
        /// The deadline that elapsed, in milliseconds
        timeout_ms: u64,
        /// Waiters still queued when this caller gave up
        waiters: usize,
        /// Most recent failure to replace a retired connection, if any
        #[source]
        source: Option<Arc<ConnectError>>,
    },

    /// A connection was returned that the pool did not lend out, or that
    /// was already returned.
    #[error("Invalid release: {reason}")]
    InvalidRelease {
        /// Why the release was rejected
        reason: String,
    },

    /// The pool has begun shutting down.
    #[error("Pool is closed")]
    PoolClosed,
}

impl PoolError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid-release error
    pub fn invalid_release<S: Into<String>>(reason: S) -> Self {
        Self::InvalidRelease {
            reason: reason.into(),
        }
    }

    /// Check if the caller may reasonably retry the operation
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AcquireTimeout { .. } | Self::Connection { .. } => true,
            Self::Configuration { .. } | Self::InvalidRelease { .. } | Self::PoolClosed => false,
        }
    }

    /// The connect failure behind this error, if there is one.
    #[must_use]
    pub fn connect_cause(&self) -> Option<&ConnectError> {
        match self {
            Self::Connection { source, .. } => Some(source.as_ref()),
            Self::AcquireTimeout { source, .. } => source.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("connection refused")]
    struct Refused;

    #[test]
    fn retryable_classification() {
        assert!(
            PoolError::AcquireTimeout {
                timeout_ms: 10,
                waiters: 0,
                source: None
            }
            .is_retryable()
        );
        assert!(!PoolError::PoolClosed.is_retryable());
        assert!(!PoolError::invalid_release("twice").is_retryable());
        assert!(!PoolError::configuration("capacity").is_retryable());
    }

    #[test]
    fn timeout_exposes_connect_cause() {
        let cause = Arc::new(ConnectError::new(Refused));
        let err = PoolError::AcquireTimeout {
            timeout_ms: 500,
            waiters: 2,
            source: Some(cause),
        };
        assert_eq!(
            err.connect_cause().map(ToString::to_string).as_deref(),
            Some("connection refused")
        );
        assert!(err.source().is_some());
        assert!(err.to_string().contains("500ms"));
    }

    #[test]
    fn connection_error_message_names_endpoint() {
        let err = PoolError::Connection {
            endpoint: "db.internal:5432".into(),
            attempts: 3,
            source: Arc::new(ConnectError::new(Refused)),
        };
        let msg = err.to_string();
        assert!(msg.contains("db.internal:5432"));
        assert!(msg.contains("3 attempt(s)"));
        assert!(msg.ends_with("connection refused"));
    }
}
