//! Logger builder implementation

mod reload;

pub use reload::ReloadHandle;

use tracing_subscriber::{
    Layer, Registry,
    fmt,
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{Config, DisplayConfig, Format};
use crate::core::{LogError, LogResult};

type FilteredRegistry = Layered<Box<dyn Layer<Registry> + Send + Sync + 'static>, Registry>;
type FmtLayer = Box<dyn Layer<FilteredRegistry> + Send + Sync + 'static>;

/// Logger builder
#[derive(Debug)]
pub struct LoggerBuilder {
    config: Config,
}

/// Guard returned by a successful install.
///
/// Holds the reload handle when the configuration asked for one.
#[derive(Debug)]
pub struct LoggerGuard {
    reload: Option<ReloadHandle>,
    format: Format,
}

impl LoggerGuard {
    /// Handle for changing the filter at runtime, if enabled.
    #[must_use]
    pub fn reload_handle(&self) -> Option<&ReloadHandle> {
        self.reload.as_ref()
    }

    /// Format the installed logger writes.
    #[must_use]
    pub fn format(&self) -> Format {
        self.format
    }
}

fn fmt_layer(format: Format, display: &DisplayConfig) -> FmtLayer {
    let layer = fmt::layer()
        .with_ansi(display.colors)
        .with_target(display.target)
        .with_file(display.source)
        .with_line_number(display.source)
        .with_thread_ids(display.thread_ids);

    match (format, display.time) {
        (Format::Pretty, true) => layer.pretty().boxed(),
        (Format::Pretty, false) => layer.pretty().without_time().boxed(),
        (Format::Compact, true) => layer.compact().boxed(),
        (Format::Compact, false) => layer.compact().without_time().boxed(),
        (Format::Json, true) => layer.json().boxed(),
        (Format::Json, false) => layer.json().without_time().boxed(),
    }
}

impl LoggerBuilder {
    /// Create builder from config
    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    /// Build and install the global subscriber.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - the filter directive cannot be parsed
    /// - a global subscriber is already installed
    pub fn build(self) -> LogResult<LoggerGuard> {
        let Config {
            level,
            format,
            display,
            reloadable,
        } = self.config;

        let filter = reload::parse_filter(&level)?;
        let (filter_layer, reload) = reload::create_filter_layer(filter, &level, reloadable);

        Registry::default()
            .with(filter_layer)
            .with(fmt_layer(format, &display))
            .try_init()
            .map_err(|e| LogError::AlreadyInitialized(e.to_string()))?;

        tracing::debug!(%level, %format, reloadable, "logger initialized");
        Ok(LoggerGuard { reload, format })
    }
}
