//! Structured logging configuration.
//!
//! Thin wrapper over `tracing-subscriber`: pick a format, a level, and an
//! optional filter directive string, then install the global subscriber once
//! at process start.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable logging
    pub enabled: bool,
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Output format
    pub format: LogFormat,
    /// Extra filter directives (e.g. "redis=warn")
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            format: LogFormat::Pretty,
            filter: None,
        }
    }
}

impl LoggingConfig {
    /// Create a default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the log level
    #[must_use]
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Use JSON output
    #[must_use]
    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    /// Set extra filter directives
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format (structured)
    Json,
    /// Pretty format (human-readable)
    #[default]
    Pretty,
    /// Compact format
    Compact,
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// Failed to install the subscriber
    #[error("Failed to initialize logging: {0}")]
    Init(String),
    /// Failed to parse filter directives
    #[error("Failed to parse log filter: {0}")]
    FilterParse(String),
}

/// Initialize the global tracing subscriber
///
/// # Errors
/// Returns an error if the filter cannot be parsed or a subscriber is
/// already installed
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    if !config.enabled {
        return Ok(());
    }

    let filter = build_filter(config)?;

    let layer = match config.format {
        LogFormat::Json => fmt::layer().json().with_target(true).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().with_target(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    // RUST_LOG wins over the configured level when present.
    if let Ok(env) = EnvFilter::try_from_default_env() {
        return Ok(env);
    }
    parse_directives(config)
}

fn parse_directives(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    let directives = match &config.filter {
        Some(filter) => format!("{},{}", config.level, filter),
        None => config.level.clone(),
    };
    EnvFilter::try_new(directives).map_err(|e| LoggingError::FilterParse(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = LoggingConfig::new()
            .with_level("debug")
            .json()
            .with_filter("redis=warn");

        assert_eq!(config.level, "debug");
        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.filter, Some("redis=warn".to_string()));
    }

    #[test]
    fn test_disabled_logging_is_a_noop() {
        let config = LoggingConfig {
            enabled: false,
            ..LoggingConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }

    #[test]
    fn test_bogus_filter_is_rejected() {
        let config = LoggingConfig::new().with_filter("not a directive!!");
        assert!(parse_directives(&config).is_err());
    }

    #[test]
    fn test_filter_directives_combine_level_and_overrides() {
        let config = LoggingConfig::new().with_level("debug").with_filter("redis=warn");
        assert!(parse_directives(&config).is_ok());
    }
}
