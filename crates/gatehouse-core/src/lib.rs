//! # Gatehouse Core
//!
//! Shared building blocks for the gatehouse admission-control gateway:
//! - Request/response types and route definitions
//! - Rate limit configuration and decisions
//! - The gateway error hierarchy
//! - An injectable clock for deterministic time handling

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod clock;
pub mod error;
pub mod types;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ApiError, ApiErrorResponse, GatewayError, GatewayResult};
pub use types::{
    GatewayRequest, GatewayResponse, RateLimitAlgorithm, RateLimitConfig, RateLimitDecision,
    Route, RouteOptions,
};
