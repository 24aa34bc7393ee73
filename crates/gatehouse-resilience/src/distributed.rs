//! Distributed rate limiting over a shared redis counter store.
//!
//! Observable semantics match [`crate::MemoryRateLimiter`]; only the state
//! location differs. Every check is a single server-side Lua script (EVAL),
//! so the read-check-increment sequence is atomic across gateway instances:
//! two instances can never both admit the request that is one over the
//! limit. `now` travels in as an argument; the store never reads its own
//! clock.

use crate::rate_limiter::{RateLimitStore, WINDOW_SECS};
use async_trait::async_trait;
use gatehouse_core::{
    GatewayError, GatewayResult, RateLimitAlgorithm, RateLimitConfig, RateLimitDecision,
};
use redis::aio::MultiplexedConnection;
use redis::Script;
use tracing::{debug, warn};
use uuid::Uuid;

/// Stored keys outlive the window by this margin before redis expires them
const KEY_TTL_SECS: i64 = 120;

/// Sliding window over a sorted set of admission timestamps
const SLIDING_SCRIPT: &str = r"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local now = tonumber(ARGV[2])
local window = tonumber(ARGV[3])
local member = ARGV[4]
local ttl = tonumber(ARGV[5])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count < limit then
    redis.call('ZADD', key, now, member)
    redis.call('EXPIRE', key, ttl)
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    return {1, limit - count - 1, tostring(tonumber(oldest[2]) + window)}
end
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
local reset = now + window
if oldest[2] then
    reset = tonumber(oldest[2]) + window
end
return {0, 0, tostring(reset)}
";

/// Token bucket stored as a hash of (tokens, last_refill)
const BUCKET_SCRIPT: &str = r"
local key = KEYS[1]
local capacity = tonumber(ARGV[1])
local rate = tonumber(ARGV[2])
local now = tonumber(ARGV[3])
local window = tonumber(ARGV[4])
local ttl = tonumber(ARGV[5])

local state = redis.call('HMGET', key, 'tokens', 'last_refill')
local tokens = tonumber(state[1])
local last = tonumber(state[2])
if tokens == nil then
    tokens = capacity
    last = now
end
local elapsed = now - last
if elapsed < 0 then
    elapsed = 0
end
tokens = math.min(tokens + elapsed * rate, capacity)

local allowed = 0
if tokens >= 1 then
    tokens = tokens - 1
    allowed = 1
end
redis.call('HMSET', key, 'tokens', tostring(tokens), 'last_refill', tostring(now))
redis.call('EXPIRE', key, ttl)

local reset = now
if allowed == 0 and rate > 0 then
    reset = now + (1 - tokens) / rate
elseif allowed == 0 then
    reset = now + window
end
return {allowed, math.floor(tokens), tostring(reset)}
";

/// Fixed window as an INCR on a boundary-suffixed key
const FIXED_SCRIPT: &str = r"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])

local current = redis.call('INCR', key)
if current == 1 then
    redis.call('EXPIRE', key, ttl)
end
if current <= limit then
    return {1, limit - current}
end
return {0, 0}
";

/// Rate limiter whose state lives in a shared redis instance.
pub struct RedisRateLimiter {
    client: redis::Client,
    key_prefix: String,
    sliding: Script,
    bucket: Script,
    fixed: Script,
}

impl RedisRateLimiter {
    /// Create a limiter against the given redis URL
    ///
    /// # Errors
    /// Returns a configuration error if the URL cannot be parsed
    pub fn new(url: &str, key_prefix: impl Into<String>) -> GatewayResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| GatewayError::configuration(format!("invalid redis url: {e}")))?;
        Ok(Self {
            client,
            key_prefix: key_prefix.into(),
            sliding: Script::new(SLIDING_SCRIPT),
            bucket: Script::new(BUCKET_SCRIPT),
            fixed: Script::new(FIXED_SCRIPT),
        })
    }

    /// Create a limiter with the default `gatehouse:rl:` key prefix
    ///
    /// # Errors
    /// Returns a configuration error if the URL cannot be parsed
    pub fn with_defaults(url: &str) -> GatewayResult<Self> {
        Self::new(url, "gatehouse:rl:")
    }

    async fn connection(&self) -> GatewayResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(store_err)
    }

    fn counter_key(&self, algorithm: RateLimitAlgorithm, key: &str) -> String {
        let tag = match algorithm {
            RateLimitAlgorithm::SlidingWindow => "sliding",
            RateLimitAlgorithm::TokenBucket => "bucket",
            RateLimitAlgorithm::FixedWindow => "fixed",
        };
        format!("{}{}:{}", self.key_prefix, tag, key)
    }

    async fn check_sliding(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: f64,
    ) -> GatewayResult<RateLimitDecision> {
        let mut conn = self.connection().await?;
        let member = Uuid::new_v4().to_string();

        let (allowed, remaining, reset): (i64, i64, String) = self
            .sliding
            .key(self.counter_key(RateLimitAlgorithm::SlidingWindow, key))
            .arg(i64::from(config.requests_per_minute))
            .arg(now)
            .arg(WINDOW_SECS)
            .arg(member)
            .arg(KEY_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        Ok(raw_decision(
            allowed,
            remaining,
            parse_reset(&reset, now)?,
            config.requests_per_minute,
        ))
    }

    async fn check_bucket(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: f64,
    ) -> GatewayResult<RateLimitDecision> {
        let mut conn = self.connection().await?;

        let (allowed, remaining, reset): (i64, i64, String) = self
            .bucket
            .key(self.counter_key(RateLimitAlgorithm::TokenBucket, key))
            .arg(i64::from(config.burst_size))
            .arg(config.refill_rate())
            .arg(now)
            .arg(WINDOW_SECS)
            .arg(KEY_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        Ok(raw_decision(
            allowed,
            remaining,
            parse_reset(&reset, now)?,
            config.requests_per_minute,
        )
        .with_bucket(config.burst_size, config.refill_rate()))
    }

    async fn check_fixed(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: f64,
    ) -> GatewayResult<RateLimitDecision> {
        let mut conn = self.connection().await?;
        let window_start = (now / WINDOW_SECS).floor() * WINDOW_SECS;

        #[allow(clippy::cast_possible_truncation)]
        let counter_key = format!(
            "{}:{}",
            self.counter_key(RateLimitAlgorithm::FixedWindow, key),
            window_start as i64
        );

        let (allowed, remaining): (i64, i64) = self
            .fixed
            .key(counter_key)
            .arg(i64::from(config.requests_per_minute))
            .arg(KEY_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        Ok(raw_decision(
            allowed,
            remaining,
            window_start + WINDOW_SECS,
            config.requests_per_minute,
        ))
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn check(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: f64,
    ) -> GatewayResult<RateLimitDecision> {
        let decision = match config.algorithm {
            RateLimitAlgorithm::SlidingWindow => self.check_sliding(key, config, now).await?,
            RateLimitAlgorithm::TokenBucket => self.check_bucket(key, config, now).await?,
            RateLimitAlgorithm::FixedWindow => self.check_fixed(key, config, now).await?,
        };

        if decision.allowed {
            debug!(key = %key, algorithm = ?config.algorithm, "Distributed rate limit check passed");
        } else {
            warn!(
                key = %key,
                algorithm = ?config.algorithm,
                limit = decision.limit,
                "Distributed rate limit exceeded"
            );
        }
        Ok(decision)
    }
}

fn store_err(e: redis::RedisError) -> GatewayError {
    GatewayError::store(e.to_string())
}

fn parse_reset(raw: &str, fallback: f64) -> GatewayResult<f64> {
    if raw.is_empty() {
        return Ok(fallback);
    }
    raw.parse::<f64>()
        .map_err(|e| GatewayError::store(format!("malformed reset from store: {e}")))
}

fn raw_decision(allowed: i64, remaining: i64, reset: f64, limit: u32) -> RateLimitDecision {
    if allowed == 1 {
        let remaining = u32::try_from(remaining.max(0)).unwrap_or(u32::MAX);
        RateLimitDecision::allow(remaining, limit, reset)
    } else {
        RateLimitDecision::deny(limit, reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_keys_are_namespaced_per_algorithm() {
        let limiter = RedisRateLimiter::with_defaults("redis://127.0.0.1/").expect("client");

        assert_eq!(
            limiter.counter_key(RateLimitAlgorithm::SlidingWindow, "alice:/api"),
            "gatehouse:rl:sliding:alice:/api"
        );
        assert_eq!(
            limiter.counter_key(RateLimitAlgorithm::TokenBucket, "alice:/api"),
            "gatehouse:rl:bucket:alice:/api"
        );
        assert_eq!(
            limiter.counter_key(RateLimitAlgorithm::FixedWindow, "alice:/api"),
            "gatehouse:rl:fixed:alice:/api"
        );
    }

    #[test]
    fn test_invalid_url_is_a_configuration_error() {
        let result = RedisRateLimiter::with_defaults("not-a-url");
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
    }

    #[test]
    fn test_raw_decision_mapping() {
        let allowed = raw_decision(1, 4, 1_060.0, 5);
        assert!(allowed.allowed);
        assert_eq!(allowed.remaining, 4);

        let denied = raw_decision(0, 0, 1_060.0, 5);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.limit, 5);
    }

    #[test]
    fn test_parse_reset_handles_malformed_values() {
        assert!((parse_reset("1060.5", 0.0).expect("parse") - 1060.5).abs() < 1e-9);
        assert!((parse_reset("", 99.0).expect("fallback") - 99.0).abs() < 1e-9);
        assert!(parse_reset("bogus", 0.0).is_err());
    }
}
