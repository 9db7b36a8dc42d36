//! # Sluice connection pool
//!
//! A bounded, fair pool of reusable connections to a backing store.
//!
//! The pool never speaks the store's protocol. Applications implement
//! [`Connector`] to open, probe and close connections, describe the target
//! with a [`ConnectionDescriptor`], and borrow connections through
//! [`Pool::acquire`].
//!
//! - At most `capacity` connections exist at any moment.
//! - Callers waiting for a connection are served in arrival order.
//! - Connections are probed before reuse (unless recently validated) and on
//!   return; broken ones are closed and replaced.
//! - [`Pool::shutdown`] drains outstanding leases with a deadline.
//!
//! ```ignore
//! let pool = Pool::connect(MyConnector, descriptor).await?;
//! let mut conn = pool.acquire_default().await?;
//! conn.execute("SELECT 1").await?;
//! pool.release(conn).await?;
//! ```

pub mod connector;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod health;
pub mod pool;
pub mod registry;
pub mod shared;

mod queue;

pub use connector::Connector;
pub use descriptor::{ConnectionDescriptor, Credentials, RetryPolicy, Warmup};
pub use error::{ConnectError, PoolError, PoolResult};
pub use events::{EventBus, PoolEvent, RetireReason};
pub use health::{HealthChecker, Verdict};
pub use pool::{Lease, Pool, PoolStats, PooledConnection, ShutdownReport};
pub use registry::{ConnectionId, SlotCounts, SlotState};
pub use shared::PoolCell;
