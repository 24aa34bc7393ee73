//! Configuration loading from files and environment.
//!
//! Sources are applied in order, later ones replacing earlier ones; partial
//! files overlay the schema defaults through serde. `${VAR}` and
//! `${VAR:-default}` references are substituted from the environment before
//! parsing, which is how bootstrap API keys stay out of config files.

use crate::schema::GatewayConfig;
use std::path::Path;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// The path that was not found
        path: String,
    },

    /// IO error
    #[error("IO error reading configuration: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Validation error
    #[error("Configuration validation error: {0}")]
    Validation(String),

    /// Unsupported file extension
    #[error("Unsupported configuration format: {extension}")]
    UnsupportedFormat {
        /// The unrecognized extension
        extension: String,
    },
}

/// Configuration source
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// File path, format chosen by extension
    File(String),
    /// Raw YAML string
    Yaml(String),
    /// Raw TOML string
    Toml(String),
    /// Raw JSON string
    Json(String),
}

/// Configuration loader
pub struct ConfigLoader {
    sources: Vec<ConfigSource>,
    env_prefix: Option<String>,
}

impl ConfigLoader {
    /// Create an empty loader; with no sources, defaults are returned
    #[must_use]
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            env_prefix: None,
        }
    }

    /// Add a configuration source
    #[must_use]
    pub fn with_source(mut self, source: ConfigSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Add a file source
    #[must_use]
    pub fn with_file(self, path: impl Into<String>) -> Self {
        self.with_source(ConfigSource::File(path.into()))
    }

    /// Set an environment variable prefix for overrides
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Load, apply env overrides, and validate
    ///
    /// # Errors
    /// Returns an error if any source fails to load or the final
    /// configuration fails validation
    pub async fn load(self) -> Result<GatewayConfig, ConfigError> {
        let mut config = GatewayConfig::default();

        for source in &self.sources {
            config = Self::load_source(source).await?;
        }

        if let Some(ref prefix) = self.env_prefix {
            apply_env_overrides(&mut config, prefix);
        }

        config
            .validate_config()
            .map_err(|e| ConfigError::Validation(format!("{e}")))?;

        info!("Configuration loaded");
        Ok(config)
    }

    async fn load_source(source: &ConfigSource) -> Result<GatewayConfig, ConfigError> {
        match source {
            ConfigSource::File(path) => Self::load_file(path).await,
            ConfigSource::Yaml(content) => parse_yaml(content),
            ConfigSource::Toml(content) => parse_toml(content),
            ConfigSource::Json(content) => parse_json(content),
        }
    }

    async fn load_file(path: &str) -> Result<GatewayConfig, ConfigError> {
        let path = Path::new(path);
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).await?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        debug!(path = %path.display(), format = %extension, "Loading configuration file");

        match extension.as_str() {
            "yaml" | "yml" => parse_yaml(&content),
            "toml" => parse_toml(&content),
            "json" => parse_json(&content),
            ext => Err(ConfigError::UnsupportedFormat {
                extension: ext.to_string(),
            }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_yaml(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(serde_yaml::from_str(&substitute_env_vars(content))?)
}

fn parse_toml(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(toml::from_str(&substitute_env_vars(content))?)
}

fn parse_json(content: &str) -> Result<GatewayConfig, ConfigError> {
    Ok(serde_json::from_str(&substitute_env_vars(content))?)
}

/// Substitute `${VAR}` and `${VAR:-default}` references
///
/// Unset variables without a default are left in place with a warning, so a
/// missing optional secret does not kill startup.
fn substitute_env_vars(content: &str) -> String {
    #[allow(clippy::expect_used)]
    let re = regex::Regex::new(r"\$\{([^}]+)\}").expect("valid regex");
    let mut result = content.to_string();

    for cap in re.captures_iter(content) {
        let full_match = &cap[0];
        let var_spec = &cap[1];

        let (var_name, default) = match var_spec.find(":-") {
            Some(idx) => (&var_spec[..idx], Some(&var_spec[idx + 2..])),
            None => (var_spec, None),
        };

        match std::env::var(var_name) {
            Ok(value) => result = result.replace(full_match, &value),
            Err(_) => match default {
                Some(default_val) => result = result.replace(full_match, default_val),
                None => warn!(variable = %var_name, "Environment variable not set"),
            },
        }
    }

    result
}

fn apply_env_overrides(config: &mut GatewayConfig, prefix: &str) {
    if let Ok(host) = std::env::var(format!("{prefix}_SERVER_HOST")) {
        config.server.host = host;
    }

    if let Ok(port) = std::env::var(format!("{prefix}_SERVER_PORT")) {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }

    if let Ok(level) = std::env::var(format!("{prefix}_LOG_LEVEL")) {
        config.observability.logging.level = level;
    }

    if let Ok(url) = std::env::var(format!("{prefix}_REDIS_URL")) {
        config.rate_limit.redis_url = Some(url);
    }
}

/// Load configuration from default locations
///
/// Search order: `CONFIG_PATH` env var, `gatehouse.yaml`, `gatehouse.yml`,
/// `config/gatehouse.yaml`, `/etc/gatehouse/config.yaml`. Falls back to
/// defaults when nothing is found.
///
/// # Errors
/// Returns an error if a discovered file fails to load or validate
pub async fn load_config() -> Result<GatewayConfig, ConfigError> {
    let config_path = std::env::var("CONFIG_PATH").ok();

    let search_paths = match &config_path {
        Some(path) => vec![path.as_str()],
        None => vec![
            "gatehouse.yaml",
            "gatehouse.yml",
            "config/gatehouse.yaml",
            "/etc/gatehouse/config.yaml",
        ],
    };

    for path in &search_paths {
        if Path::new(path).exists() {
            info!(path = %path, "Loading configuration");
            return ConfigLoader::new()
                .with_file(*path)
                .with_env_prefix("GATEHOUSE")
                .load()
                .await;
        }
    }

    warn!("No configuration file found, using defaults");
    Ok(GatewayConfig::default())
}
