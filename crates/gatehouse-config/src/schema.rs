//! Configuration schema definitions.
//!
//! All types carry serde defaults so a partial file (or none at all) yields
//! a runnable configuration.

use gatehouse_core::{RateLimitConfig, RouteOptions};
use gatehouse_telemetry::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Routes registered at startup
    #[validate(nested)]
    pub routes: Vec<RouteConfig>,

    /// Rate limiting configuration
    pub rate_limit: RateLimitSettings,

    /// Circuit breaker configuration
    pub circuit_breaker: CircuitBreakerSettings,

    /// Security configuration
    pub security: SecurityConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl GatewayConfig {
    /// Validate the configuration
    ///
    /// # Errors
    /// Returns validation errors if the configuration is invalid
    pub fn validate_config(&self) -> Result<(), validator::ValidationErrors> {
        self.validate()
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host
    #[validate(length(min = 1))]
    pub host: String,

    /// Bind port
    #[validate(range(min = 1, max = 65535))]
    pub port: u16,

    /// Request timeout
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Graceful shutdown timeout
    #[serde(with = "humantime_serde")]
    pub graceful_shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
            graceful_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// A route registered at startup
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RouteConfig {
    /// Path prefix
    #[validate(length(min = 1))]
    pub path: String,

    /// Backend target URL
    #[validate(length(min = 1))]
    pub backend_url: String,

    /// Require API key authentication
    #[serde(default)]
    pub require_auth: bool,

    /// Route-level rate limit
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Response cache TTL in seconds; 0 disables caching
    #[serde(default)]
    pub cache_ttl: u64,
}

impl RouteConfig {
    /// Registration options derived from this config entry
    #[must_use]
    pub fn options(&self) -> RouteOptions {
        RouteOptions {
            require_auth: self.require_auth,
            rate_limit: self.rate_limit,
            cache_ttl: self.cache_ttl,
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Default limit applied when a route specifies nothing
    pub default: RateLimitConfig,

    /// Redis URL; set to enable the distributed limiter backend
    pub redis_url: Option<String>,

    /// Key prefix for distributed counters
    pub key_prefix: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default: RateLimitConfig::default(),
            redis_url: None,
            key_prefix: "gatehouse:rl:".to_string(),
        }
    }
}

/// Circuit breaker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures before opening
    pub failure_threshold: u32,

    /// Consecutive trial successes before closing
    pub success_threshold: u32,

    /// Time the breaker stays open before admitting trials
    #[serde(with = "humantime_serde")]
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// Keys seeded before any dynamic creation, for operability
    pub bootstrap_keys: Vec<BootstrapKey>,
}

/// A pre-provisioned API key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapKey {
    /// The key string (commonly a `${VAR}` reference in files)
    pub key: String,

    /// Owner name
    pub name: String,

    /// Optional per-key rate limit override
    #[serde(default)]
    pub rate_limit: Option<RateLimitConfig>,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::RateLimitAlgorithm;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert!(config.validate_config().is_ok());
        assert_eq!(config.server.socket_addr(), "0.0.0.0:8080");
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn test_invalid_port_fails_validation() {
        let mut config = GatewayConfig::default();
        config.server.port = 0;
        assert!(config.validate_config().is_err());
    }

    #[test]
    fn test_route_config_yaml_round_trip() {
        let yaml = r#"
path: /api/orders
backend_url: http://orders.internal:8080
require_auth: true
rate_limit:
  requests_per_minute: 30
  algorithm: token_bucket
  burst_size: 5
cache_ttl: 60
"#;
        let route: RouteConfig = serde_yaml::from_str(yaml).expect("parse");
        assert!(route.require_auth);
        assert_eq!(route.rate_limit.algorithm, RateLimitAlgorithm::TokenBucket);
        assert_eq!(route.rate_limit.burst_size, 5);

        let options = route.options();
        assert_eq!(options.cache_ttl, 60);
    }

    #[test]
    fn test_recovery_timeout_accepts_humantime() {
        let yaml = "recovery_timeout: 45s\nfailure_threshold: 2\n";
        let settings: CircuitBreakerSettings = serde_yaml::from_str(yaml).expect("parse");
        assert_eq!(settings.recovery_timeout, Duration::from_secs(45));
        assert_eq!(settings.failure_threshold, 2);
        assert_eq!(settings.success_threshold, 3);
    }

    #[test]
    fn test_rate_limit_settings_defaults() {
        let settings = RateLimitSettings::default();
        assert!(settings.redis_url.is_none());
        assert_eq!(settings.default.requests_per_minute, 60);
    }
}
