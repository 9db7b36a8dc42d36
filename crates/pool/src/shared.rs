//! Process-wide pool handle.
//!
//! The library keeps no global of its own. Applications that want one pool
//! shared across the process declare a `static` cell and install the pool at
//! startup:
//!
//! ```ignore
//! static POOL: PoolCell<MyConnector> = PoolCell::new();
//!
//! POOL.set(Pool::connect(MyConnector, descriptor).await?)?;
//! let conn = POOL.get()?.acquire_default().await?;
//! ```

use std::sync::OnceLock;

use crate::connector::Connector;
use crate::error::{PoolError, PoolResult};
use crate::pool::Pool;

/// Set-once holder for a [`Pool`].
pub struct PoolCell<C: Connector> {
    cell: OnceLock<Pool<C>>,
}

impl<C: Connector> PoolCell<C> {
    /// An empty cell, usable in a `static`.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Install the pool.
    ///
    /// # Errors
    /// Returns `Configuration` if a pool is already installed. The rejected
    /// pool is dropped without being shut down.
    pub fn set(&self, pool: Pool<C>) -> PoolResult<()> {
        self.cell.set(pool).map_err(|rejected| {
            tracing::warn!(pool_id = %rejected.id(), "shared pool already installed");
            PoolError::configuration("shared pool is already initialized")
        })
    }

    /// The installed pool.
    ///
    /// # Errors
    /// Returns `Configuration` if nothing has been installed yet.
    pub fn get(&self) -> PoolResult<&Pool<C>> {
        self.cell
            .get()
            .ok_or_else(|| PoolError::configuration("shared pool is not initialized"))
    }

    /// Whether a pool has been installed.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<C: Connector> Default for PoolCell<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> std::fmt::Debug for PoolCell<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolCell")
            .field("pool", &self.cell.get())
            .finish()
    }
}
