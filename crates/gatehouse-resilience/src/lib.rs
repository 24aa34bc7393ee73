//! # Gatehouse Resilience
//!
//! Resilience patterns for the gatehouse gateway:
//! - Multi-algorithm rate limiting (sliding window, token bucket, fixed window)
//! - Distributed rate limiting over a shared counter store
//! - Circuit breaker for failing backend targets
//! - TTL-keyed response caching

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod circuit_breaker;
pub mod distributed;
pub mod rate_limiter;

// Re-export main types
pub use cache::{CacheKey, ResponseCache};
pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerManager, CircuitState,
};
pub use distributed::RedisRateLimiter;
pub use rate_limiter::{MemoryRateLimiter, RateLimitStore, WINDOW_SECS};
