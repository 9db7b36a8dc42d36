//! Error types

use thiserror::Error;

/// Result alias for logger setup
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while configuring or installing the logger
#[derive(Debug, Error)]
pub enum LogError {
    /// The filter directive could not be parsed
    #[error("Invalid filter directive: {0}")]
    Filter(String),

    /// The configuration could not be applied
    #[error("Configuration error: {0}")]
    Config(String),

    /// A global subscriber is already installed
    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        let err = LogError::Filter("sluice=verbose: invalid level".into());
        assert_eq!(err.to_string(), "Invalid filter directive: sluice=verbose: invalid level");
    }
}
