//! Connection descriptor: the immutable configuration a pool is built from.
//!
//! Durations are expressed in whole milliseconds on the wire (`*_ms` keys)
//! so descriptors can live in plain JSON config files.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::{PoolError, PoolResult};

/// Login for the backing store.
///
/// The password is held in a [`SecretString`] and never appears in `Debug`
/// output.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// User name presented to the store
    pub username: String,
    /// Password presented to the store
    #[serde(deserialize_with = "deserialize_secret")]
    pub password: SecretString,
}

impl Credentials {
    /// Create credentials from a user name and password.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Credentials for stores that do not authenticate.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new("", "")
    }

    /// Expose the password to a driver.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

/// When physical connections are opened.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Warmup {
    /// Every slot is filled by [`Pool::initialize`](crate::Pool::initialize).
    Eager,
    /// Slots are filled on first demand.
    #[default]
    Lazy,
}

/// Retry policy the pool applies when opening a connection fails.
///
/// The connector itself never retries; the pool makes up to `max_attempts`
/// calls, doubling `backoff` between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    /// Delay before the second attempt
    #[serde(rename = "backoff_ms", with = "duration_ms", default = "default_backoff")]
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A policy that makes a single attempt.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(100),
        }
    }

    /// Delay to wait after the given (1-based) failed attempt.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

fn default_attempts() -> u32 {
    1
}

fn default_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_validation_window() -> Duration {
    Duration::from_secs(5)
}

fn default_validation_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Immutable configuration for a [`Pool`](crate::Pool).
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionDescriptor {
    /// Address of the backing store, interpreted only by the connector
    pub endpoint: String,
    /// Login presented when opening connections
    #[serde(default)]
    pub credentials: Credentials,
    /// Number of slots; the pool never holds more connections than this
    pub capacity: usize,
    /// Deadline used by [`Pool::acquire_default`](crate::Pool::acquire_default)
    #[serde(rename = "acquire_timeout_ms", with = "duration_ms", default = "default_acquire_timeout")]
    pub acquire_timeout: Duration,
    /// Whether slots are filled at start-up or on demand
    #[serde(default)]
    pub warmup: Warmup,
    /// Hand-out skips the probe if the connection passed one this recently
    #[serde(rename = "validation_window_ms", with = "duration_ms", default = "default_validation_window")]
    pub validation_window: Duration,
    /// A probe that takes longer than this counts as failed
    #[serde(rename = "validation_timeout_ms", with = "duration_ms", default = "default_validation_timeout")]
    pub validation_timeout: Duration,
    /// Connections older than this are retired when they are returned
    #[serde(rename = "max_lifetime_ms", with = "opt_duration_ms", default)]
    pub max_lifetime: Option<Duration>,
    /// Retry policy for opening connections
    #[serde(default)]
    pub connect_retry: RetryPolicy,
}

impl ConnectionDescriptor {
    /// Create a descriptor with default timeouts.
    pub fn new(endpoint: impl Into<String>, credentials: Credentials, capacity: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials,
            capacity,
            acquire_timeout: default_acquire_timeout(),
            warmup: Warmup::default(),
            validation_window: default_validation_window(),
            validation_timeout: default_validation_timeout(),
            max_lifetime: None,
            connect_retry: RetryPolicy::default(),
        }
    }

    /// Parse a descriptor from JSON and validate it.
    pub fn from_json(json: &str) -> PoolResult<Self> {
        let descriptor: Self = serde_json::from_str(json)
            .map_err(|e| PoolError::configuration(format!("invalid descriptor: {e}")))?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Set the default acquire timeout.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set the warm-up mode.
    pub fn with_warmup(mut self, warmup: Warmup) -> Self {
        self.warmup = warmup;
        self
    }

    /// Set the hand-out freshness window. Zero probes on every hand-out.
    pub fn with_validation_window(mut self, window: Duration) -> Self {
        self.validation_window = window;
        self
    }

    /// Set the probe timeout.
    pub fn with_validation_timeout(mut self, timeout: Duration) -> Self {
        self.validation_timeout = timeout;
        self
    }

    /// Retire connections older than `lifetime` when they come back.
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Set the connect retry policy.
    pub fn with_connect_retry(mut self, retry: RetryPolicy) -> Self {
        self.connect_retry = retry;
        self
    }

    /// Validate the descriptor, returning an error if it is unusable.
    pub fn validate(&self) -> PoolResult<()> {
        if self.endpoint.trim().is_empty() {
            return Err(PoolError::configuration("endpoint must not be empty"));
        }
        if self.capacity == 0 {
            return Err(PoolError::configuration(
                "capacity must be greater than 0",
            ));
        }
        if self.acquire_timeout.is_zero() {
            return Err(PoolError::configuration(
                "acquire_timeout must be greater than zero",
            ));
        }
        if self.validation_timeout.is_zero() {
            return Err(PoolError::configuration(
                "validation_timeout must be greater than zero",
            ));
        }
        if self.max_lifetime.is_some_and(|lifetime| lifetime.is_zero()) {
            return Err(PoolError::configuration(
                "max_lifetime must be greater than zero when set",
            ));
        }
        if self.connect_retry.max_attempts == 0 {
            return Err(PoolError::configuration(format!(
                "connect_retry.max_attempts must be at least 1 (got {})",
                self.connect_retry.max_attempts
            )));
        }
        Ok(())
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

mod opt_duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn descriptor() -> ConnectionDescriptor {
        ConnectionDescriptor::new("sqlite://interview.db", Credentials::anonymous(), 5)
    }

    #[test]
    fn defaults_are_valid() {
        let d = descriptor();
        assert!(d.validate().is_ok());
        assert_eq!(d.warmup, Warmup::Lazy);
        assert_eq!(d.acquire_timeout, Duration::from_secs(30));
        assert_eq!(d.connect_retry, RetryPolicy::none());
    }

    #[test]
    fn rejects_bad_values() {
        assert!(ConnectionDescriptor { capacity: 0, ..descriptor() }.validate().is_err());
        assert!(ConnectionDescriptor { endpoint: "  ".into(), ..descriptor() }.validate().is_err());
        assert!(descriptor().with_acquire_timeout(Duration::ZERO).validate().is_err());
        assert!(descriptor().with_validation_timeout(Duration::ZERO).validate().is_err());
        assert!(descriptor().with_max_lifetime(Duration::ZERO).validate().is_err());
        let no_attempts = RetryPolicy {
            max_attempts: 0,
            backoff: Duration::from_millis(1),
        };
        assert!(descriptor().with_connect_retry(no_attempts).validate().is_err());
    }

    #[test]
    fn parses_json_with_millisecond_durations() {
        let d = ConnectionDescriptor::from_json(
            r#"{
                "endpoint": "postgres://db:5432/shop",
                "credentials": { "username": "app", "password": "hunter2" },
                "capacity": 8,
                "acquire_timeout_ms": 500,
                "warmup": "eager",
                "max_lifetime_ms": 60000,
                "connect_retry": { "max_attempts": 3, "backoff_ms": 20 }
            }"#,
        )
        .unwrap();

        assert_eq!(d.capacity, 8);
        assert_eq!(d.acquire_timeout, Duration::from_millis(500));
        assert_eq!(d.warmup, Warmup::Eager);
        assert_eq!(d.max_lifetime, Some(Duration::from_secs(60)));
        assert_eq!(d.validation_window, Duration::from_secs(5));
        assert_eq!(d.connect_retry.max_attempts, 3);
        assert_eq!(d.credentials.password(), "hunter2");
    }

    #[test]
    fn json_capacity_zero_is_configuration_error() {
        let err = ConnectionDescriptor::from_json(r#"{ "endpoint": "mem", "capacity": 0 }"#)
            .unwrap_err();
        assert!(matches!(err, PoolError::Configuration { .. }));
    }

    #[test]
    fn debug_redacts_password() {
        let creds = Credentials::new("app", "hunter2");
        let out = format!("{creds:?}");
        assert!(out.contains("app"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn backoff_doubles() {
        let retry = RetryPolicy {
            max_attempts: 4,
            backoff: Duration::from_millis(10),
        };
        assert_eq!(retry.delay_after(1), Duration::from_millis(10));
        assert_eq!(retry.delay_after(2), Duration::from_millis(20));
        assert_eq!(retry.delay_after(3), Duration::from_millis(40));
    }
}
