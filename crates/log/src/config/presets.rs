//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Format};

impl Config {
    /// Create configuration from environment variables.
    ///
    /// `SLUICE_LOG` (falling back to `RUST_LOG`) sets the filter,
    /// `SLUICE_LOG_FORMAT` the format, and `NO_COLOR` turns colours off.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(level) = lookup("SLUICE_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }

        if let Some(format) = lookup("SLUICE_LOG_FORMAT") {
            // Unknown formats fall back to the default.
            config.format = format.parse().unwrap_or_default();
        }

        if lookup("NO_COLOR").is_some_and(|v| !v.is_empty()) {
            config.display.colors = false;
        }

        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                ..DisplayConfig::default()
            },
            reloadable: true,
        }
    }

    /// Test configuration (compact, no colours or timestamps)
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                time: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn sluice_log_wins_over_rust_log() {
        let config = Config::from_lookup(lookup(&[
            ("RUST_LOG", "warn"),
            ("SLUICE_LOG", "sluice_pool=trace"),
        ]));
        assert_eq!(config.level, "sluice_pool=trace");

        let config = Config::from_lookup(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn format_and_colour_switches() {
        let config = Config::from_lookup(lookup(&[
            ("SLUICE_LOG_FORMAT", "JSON"),
            ("NO_COLOR", "1"),
        ]));
        assert_eq!(config.format, Format::Json);
        assert!(!config.display.colors);

        let config = Config::from_lookup(lookup(&[("SLUICE_LOG_FORMAT", "logfmt")]));
        assert_eq!(config.format, Format::Compact);
    }

    #[test]
    fn presets() {
        assert_eq!(Config::development().format, Format::Pretty);
        assert_eq!(Config::production().format, Format::Json);
        assert!(Config::production().reloadable);
        assert!(!Config::test().display.time);
    }

    #[test]
    fn deserializes_partial_config() {
        let config: Config =
            serde_json::from_str(r#"{ "level": "debug", "format": "pretty" }"#).unwrap();
        assert_eq!(config.level, "debug");
        assert_eq!(config.format, Format::Pretty);
        assert_eq!(config.display, DisplayConfig::default());
    }
}
