//! Diagnostic logging setup
//!
//! One global `tracing` subscriber writing to stderr, plain text or JSON.
//! `RUST_LOG` overrides the configured level.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{EmsxError, EmsxResult};

/// Configuration for diagnostic logging
///
/// Diagnostics go to stderr. Stdout belongs to the console sink.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use when `RUST_LOG` does not say otherwise
    pub level: Level,
    /// Whether to enable JSON formatting
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::WARN,
            json: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::default().add_directive(self.level.into()))
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn setup_logging(config: LoggingConfig) -> EmsxResult<()> {
    let builder = fmt::Subscriber::builder()
        .with_env_filter(config.env_filter())
        .with_writer(std::io::stderr);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| EmsxError::invalid_configuration("logging", e.to_string()))
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> EmsxResult<Level> {
    Level::from_str(level)
        .map_err(|_| EmsxError::invalid_configuration("log_level", format!("Invalid log level: {}", level)))
}

/// Log a welcome message with version info
pub fn log_welcome(app_name: &str, version: &str) {
    tracing::info!("Starting {} v{}", app_name, version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn test_builder_flags() {
        let config = LoggingConfig::new(Level::INFO);
        assert_eq!(config.level, Level::INFO);
        assert!(!config.json);
        assert!(config.with_json().json);
    }

    #[test]
    fn test_second_install_is_an_error() {
        let _ = setup_logging(LoggingConfig::default());
        assert!(setup_logging(LoggingConfig::default()).is_err());
    }
}
