//! Core request, response, and route types.
//!
//! These types form the inbound/outbound contract of the gateway. The HTTP
//! listener that produces a [`GatewayRequest`] and writes a
//! [`GatewayResponse`] back to the wire lives outside this workspace.

use http::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An inbound request as seen by the admission-control core.
///
/// Header names are stored lowercase so lookups are case-insensitive
/// regardless of what the transport hands us.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    /// Request path (e.g. `/api/v1/users/42`)
    pub path: String,
    /// HTTP method
    pub method: Method,
    /// Request headers, lowercase names
    pub headers: HashMap<String, String>,
    /// Client address as reported by the transport
    pub remote_addr: Option<String>,
    /// Raw request body, if any
    pub body: Option<String>,
}

impl GatewayRequest {
    /// Create a request with the given method and path
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            headers: HashMap::new(),
            remote_addr: None,
            body: None,
        }
    }

    /// Convenience constructor for a GET request
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    /// Add a header (name is lowercased)
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Set the client address
    #[must_use]
    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = Some(addr.into());
        self
    }

    /// Set the request body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Look up a header by case-insensitive name
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// An outbound response produced by the gateway or a backend.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body
    pub body: String,
    /// Response headers
    pub headers: HashMap<String, String>,
}

impl GatewayResponse {
    /// Create a response with the given status and body
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            headers: HashMap::new(),
        }
    }

    /// Create a 200 OK response
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body)
    }

    /// Create a response with a JSON-serialized body
    ///
    /// # Errors
    /// Returns a serialization error if `body` cannot be encoded
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Result<Self, serde_json::Error> {
        let body = serde_json::to_string(body)?;
        Ok(Self::new(status, body)
            .with_header("content-type", "application/json"))
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_lowercase(), value.into());
        self
    }

    /// Whether the status code is in the 2xx range
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Rate limiting algorithm selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    /// Count events in a continuously-moving trailing 60s interval
    #[default]
    SlidingWindow,
    /// Capacity-bounded counter refilled continuously, decremented per admit
    TokenBucket,
    /// Counter reset at aligned 60s wall-clock boundaries
    FixedWindow,
}

/// Rate limit configuration for a route or API key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Requests admitted per minute
    pub requests_per_minute: u32,
    /// Algorithm used to enforce the limit
    pub algorithm: RateLimitAlgorithm,
    /// Bucket capacity; only meaningful for [`RateLimitAlgorithm::TokenBucket`]
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            algorithm: RateLimitAlgorithm::SlidingWindow,
            burst_size: 10,
        }
    }
}

impl RateLimitConfig {
    /// Sliding-window config with the given per-minute limit
    #[must_use]
    pub fn per_minute(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            algorithm: RateLimitAlgorithm::SlidingWindow,
            burst_size: 0,
        }
    }

    /// Token-bucket config with the given refill rate and capacity
    #[must_use]
    pub fn token_bucket(requests_per_minute: u32, burst_size: u32) -> Self {
        Self {
            requests_per_minute,
            algorithm: RateLimitAlgorithm::TokenBucket,
            burst_size,
        }
    }

    /// Fixed-window config with the given per-minute limit
    #[must_use]
    pub fn fixed_window(requests_per_minute: u32) -> Self {
        Self {
            requests_per_minute,
            algorithm: RateLimitAlgorithm::FixedWindow,
            burst_size: 0,
        }
    }

    /// Token refill rate in tokens per second
    #[must_use]
    pub fn refill_rate(&self) -> f64 {
        f64::from(self.requests_per_minute) / 60.0
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitDecision {
    /// Whether the request was admitted
    pub allowed: bool,
    /// Requests remaining in the current window/bucket
    pub remaining: u32,
    /// The configured limit
    pub limit: u32,
    /// Unix timestamp at which capacity is restored
    pub reset: f64,
    /// Bucket capacity (token bucket only)
    pub burst_size: Option<u32>,
    /// Refill rate in tokens/sec (token bucket only)
    pub refill_rate: Option<f64>,
}

impl RateLimitDecision {
    /// An admitted request
    #[must_use]
    pub fn allow(remaining: u32, limit: u32, reset: f64) -> Self {
        Self {
            allowed: true,
            remaining,
            limit,
            reset,
            burst_size: None,
            refill_rate: None,
        }
    }

    /// A denied request
    #[must_use]
    pub fn deny(limit: u32, reset: f64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            limit,
            reset,
            burst_size: None,
            refill_rate: None,
        }
    }

    /// Attach token-bucket metadata
    #[must_use]
    pub fn with_bucket(mut self, burst_size: u32, refill_rate: f64) -> Self {
        self.burst_size = Some(burst_size);
        self.refill_rate = Some(refill_rate);
        self
    }
}

/// A registered route. Immutable after registration; owned by the router.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Path prefix this route matches
    pub path: String,
    /// Backend target URL requests are dispatched to
    pub backend_url: String,
    /// Whether a valid API key is required
    pub require_auth: bool,
    /// Default rate limit for this route
    pub rate_limit: RateLimitConfig,
    /// Response cache TTL in seconds; 0 disables caching
    pub cache_ttl: u64,
}

impl Route {
    /// Create a route from a path, backend, and options
    #[must_use]
    pub fn new(path: impl Into<String>, backend_url: impl Into<String>, options: RouteOptions) -> Self {
        Self {
            path: path.into(),
            backend_url: backend_url.into(),
            require_auth: options.require_auth,
            rate_limit: options.rate_limit,
            cache_ttl: options.cache_ttl,
        }
    }
}

/// Options supplied at route registration.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteOptions {
    /// Require API key authentication
    pub require_auth: bool,
    /// Route-level rate limit
    pub rate_limit: RateLimitConfig,
    /// Response cache TTL in seconds; 0 disables caching
    pub cache_ttl: u64,
}

impl RouteOptions {
    /// Create default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require authentication
    #[must_use]
    pub fn with_auth(mut self) -> Self {
        self.require_auth = true;
        self
    }

    /// Set the rate limit
    #[must_use]
    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = config;
        self
    }

    /// Set the cache TTL in seconds
    #[must_use]
    pub fn with_cache_ttl(mut self, seconds: u64) -> Self {
        self.cache_ttl = seconds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_header_lookup_is_case_insensitive() {
        let request = GatewayRequest::get("/api/users")
            .with_header("X-Api-Key", "secret")
            .with_header("accept", "application/json");

        assert_eq!(request.header("x-api-key"), Some("secret"));
        assert_eq!(request.header("X-API-KEY"), Some("secret"));
        assert_eq!(request.header("Accept"), Some("application/json"));
        assert_eq!(request.header("authorization"), None);
    }

    #[test]
    fn test_response_json_sets_content_type() {
        let response = GatewayResponse::json(
            StatusCode::OK,
            &serde_json::json!({ "status": "ok" }),
        )
        .expect("serialize");

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(
            response.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
        assert!(response.body.contains("\"status\""));
    }

    #[test]
    fn test_rate_limit_config_refill_rate() {
        let config = RateLimitConfig::token_bucket(120, 10);
        assert!((config.refill_rate() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_rate_limit_algorithm_serde_names() {
        let json = serde_json::to_string(&RateLimitAlgorithm::TokenBucket).expect("serialize");
        assert_eq!(json, "\"token_bucket\"");

        let parsed: RateLimitAlgorithm =
            serde_json::from_str("\"fixed_window\"").expect("deserialize");
        assert_eq!(parsed, RateLimitAlgorithm::FixedWindow);
    }

    #[test]
    fn test_route_from_options() {
        let route = Route::new(
            "/api/orders",
            "http://orders.internal:8080",
            RouteOptions::new()
                .with_auth()
                .with_rate_limit(RateLimitConfig::per_minute(30))
                .with_cache_ttl(15),
        );

        assert!(route.require_auth);
        assert_eq!(route.rate_limit.requests_per_minute, 30);
        assert_eq!(route.cache_ttl, 15);
    }
}
