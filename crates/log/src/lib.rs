//! # Sluice logging
//!
//! One-call logging setup over `tracing-subscriber` for services built on
//! `sluice-pool`.
//!
//! ```no_run
//! let _guard = sluice_log::init_with(sluice_log::Config::development())?;
//! tracing::info!("ready");
//! # Ok::<(), sluice_log::LogError>(())
//! ```

mod builder;
mod config;
mod core;

pub use builder::{LoggerBuilder, LoggerGuard, ReloadHandle};
pub use config::{Config, DisplayConfig, Format};
pub use crate::core::{LogError, LogResult};

/// Install the logger with default settings.
///
/// # Errors
/// Returns error if a global subscriber is already installed
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Install the logger with the given configuration.
///
/// # Errors
/// Returns error if the filter does not parse or a global subscriber is
/// already installed
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

/// Install the logger configured from the environment.
///
/// See [`Config::from_env`] for the variables read.
///
/// # Errors
/// Returns error if the filter does not parse or a global subscriber is
/// already installed
pub fn auto_init() -> LogResult<LoggerGuard> {
    init_with(Config::from_env())
}
