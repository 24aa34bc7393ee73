//! Error types and handling for the gateway.
//!
//! One error hierarchy covers every admission decision so callers can match
//! on the variant, map it to an HTTP status code, and serialize a structured
//! body for clients.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type alias using `GatewayError`
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Gateway error type covering all admission and dispatch scenarios
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No registered route matches the request path
    #[error("No route matches path: {path}")]
    RouteNotFound {
        /// The path that failed to match
        path: String,
    },

    /// Authentication failed on a protected route
    #[error("Authentication failed: {message}")]
    Authentication {
        /// Error message
        message: String,
    },

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {limit} requests per minute")]
    RateLimitExceeded {
        /// The limit that was exceeded
        limit: u32,
        /// Unix timestamp at which capacity is restored
        reset: f64,
    },

    /// Circuit breaker is open for a backend target
    #[error("Circuit open for target: {target}")]
    CircuitOpen {
        /// Target with the open circuit
        target: String,
    },

    /// Error propagated verbatim from the backend transport
    #[error("Backend error from {target}: {message}")]
    Backend {
        /// Backend target that returned the error
        target: String,
        /// Error message
        message: String,
        /// HTTP status code from the backend, if any
        status_code: Option<u16>,
    },

    /// Shared counter store failure (distributed rate limiting)
    #[error("Counter store error: {message}")]
    Store {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error message
        message: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message
        message: String,
    },
}

impl GatewayError {
    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Authentication { .. } => StatusCode::UNAUTHORIZED,
            Self::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Backend { status_code, .. } => status_code
                .and_then(|code| StatusCode::from_u16(code).ok())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            Self::Store { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the error type string for API responses
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "not_found_error",
            Self::Authentication { .. } => "authentication_error",
            Self::RateLimitExceeded { .. } => "rate_limit_error",
            Self::CircuitOpen { .. } => "service_unavailable_error",
            Self::Backend { .. } => "backend_error",
            Self::Store { .. } | Self::Configuration { .. } | Self::Internal { .. } => {
                "internal_error"
            }
        }
    }

    /// Get the error code for programmatic handling
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "route_not_found",
            Self::Authentication { .. } => "authentication_failed",
            Self::RateLimitExceeded { .. } => "rate_limit_exceeded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Backend { .. } => "backend_error",
            Self::Store { .. } => "store_error",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Check if this error is retryable by the caller
    ///
    /// Circuit-open rejections are distinguishable from backend failures
    /// precisely so callers can skip retrying while the breaker is open.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimitExceeded { .. } | Self::Backend { .. } | Self::Store { .. }
        )
    }

    /// Create a route-not-found error
    #[must_use]
    pub fn route_not_found(path: impl Into<String>) -> Self {
        Self::RouteNotFound { path: path.into() }
    }

    /// Create an authentication error
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a rate-limit error
    #[must_use]
    pub fn rate_limit(limit: u32, reset: f64) -> Self {
        Self::RateLimitExceeded { limit, reset }
    }

    /// Create a circuit-open error
    #[must_use]
    pub fn circuit_open(target: impl Into<String>) -> Self {
        Self::CircuitOpen {
            target: target.into(),
        }
    }

    /// Create a backend error
    #[must_use]
    pub fn backend(
        target: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
    ) -> Self {
        Self::Backend {
            target: target.into(),
            message: message.into(),
            status_code,
        }
    }

    /// Create a counter store error
    #[must_use]
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// API error response format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details
    pub error: ApiError,
}

/// API error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error type
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message
    pub message: String,
    /// Error code
    pub code: String,
}

impl From<&GatewayError> for ApiErrorResponse {
    fn from(err: &GatewayError) -> Self {
        Self {
            error: ApiError {
                error_type: err.error_type().to_string(),
                message: err.to_string(),
                code: err.error_code().to_string(),
            },
        }
    }
}

impl fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            GatewayError::route_not_found("/missing").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            GatewayError::authentication("bad key").status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            GatewayError::rate_limit(10, 120.0).status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            GatewayError::circuit_open("orders").status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::backend("orders", "boom", None).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::backend("orders", "not found upstream", Some(404)).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_circuit_open_is_distinct_from_backend_failure() {
        let open = GatewayError::circuit_open("orders");
        let backend = GatewayError::backend("orders", "timeout", None);

        assert!(!open.is_retryable());
        assert!(backend.is_retryable());
        assert_ne!(open.error_code(), backend.error_code());
    }

    #[test]
    fn test_api_error_response() {
        let err = GatewayError::rate_limit(5, 60.0);
        let response = ApiErrorResponse::from(&err);

        assert_eq!(response.error.error_type, "rate_limit_error");
        assert_eq!(response.error.code, "rate_limit_exceeded");
        assert!(response.error.message.contains('5'));
    }
}
