//! # Gatehouse Config
//!
//! Configuration schema and loading for the gatehouse gateway. Supports
//! YAML, TOML, and JSON sources with `${VAR}` environment substitution and
//! prefix-based environment overrides.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod loader;
pub mod schema;

pub use loader::{load_config, ConfigError, ConfigLoader, ConfigSource};
pub use schema::{
    BootstrapKey, CircuitBreakerSettings, GatewayConfig, ObservabilityConfig,
    RateLimitSettings, RouteConfig, SecurityConfig, ServerConfig,
};
