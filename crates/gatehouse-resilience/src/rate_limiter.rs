//! Multi-algorithm rate limiting.
//!
//! Three admission algorithms over a one-minute horizon: sliding window,
//! token bucket, and fixed window. State is partitioned per caller key so
//! activity on one key never affects another's counters. Every check is a
//! pure function of an explicit `now` timestamp.

use async_trait::async_trait;
use dashmap::DashMap;
use gatehouse_core::{
    GatewayResult, RateLimitAlgorithm, RateLimitConfig, RateLimitDecision,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Width of the rate-limit horizon in seconds
pub const WINDOW_SECS: f64 = 60.0;

/// Admission check surface shared by the memory- and redis-backed limiters.
///
/// Call sites hold a `dyn RateLimitStore`, so the two backends interchange
/// without touching the gateway.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Decide whether the request identified by `key` is admitted at `now`
    ///
    /// # Errors
    /// Returns an error only for store failures; a denial is an `Ok`
    /// decision with `allowed == false`.
    async fn check(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: f64,
    ) -> GatewayResult<RateLimitDecision>;
}

/// Per-key limiter state, variant chosen by the configured algorithm
enum KeyState {
    Sliding {
        /// Admission timestamps within the trailing window, oldest first
        timestamps: VecDeque<f64>,
    },
    Bucket {
        tokens: f64,
        last_refill: f64,
    },
    Fixed {
        window_start: f64,
        count: u32,
    },
}

impl KeyState {
    fn new(config: &RateLimitConfig, now: f64) -> Self {
        match config.algorithm {
            RateLimitAlgorithm::SlidingWindow => Self::Sliding {
                timestamps: VecDeque::new(),
            },
            RateLimitAlgorithm::TokenBucket => Self::Bucket {
                tokens: f64::from(config.burst_size),
                last_refill: now,
            },
            RateLimitAlgorithm::FixedWindow => Self::Fixed {
                window_start: window_boundary(now),
                count: 0,
            },
        }
    }

    fn matches(&self, algorithm: RateLimitAlgorithm) -> bool {
        matches!(
            (self, algorithm),
            (Self::Sliding { .. }, RateLimitAlgorithm::SlidingWindow)
                | (Self::Bucket { .. }, RateLimitAlgorithm::TokenBucket)
                | (Self::Fixed { .. }, RateLimitAlgorithm::FixedWindow)
        )
    }

    /// Timestamp of the most recent activity, for idle-state sweeping
    fn last_activity(&self) -> f64 {
        match self {
            Self::Sliding { timestamps } => timestamps.back().copied().unwrap_or(0.0),
            Self::Bucket { last_refill, .. } => *last_refill,
            Self::Fixed { window_start, .. } => *window_start,
        }
    }
}

/// Start of the aligned window containing `now`
fn window_boundary(now: f64) -> f64 {
    (now / WINDOW_SECS).floor() * WINDOW_SECS
}

/// In-memory rate limiter with per-key state.
///
/// Keys live in a sharded map; each key's state sits behind its own mutex,
/// so concurrent checks on the same key serialize while unrelated keys
/// proceed without contention.
pub struct MemoryRateLimiter {
    states: DashMap<String, Mutex<KeyState>>,
}

impl MemoryRateLimiter {
    /// Create an empty limiter
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    /// Number of keys currently tracked
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.states.len()
    }

    /// Drop state for keys idle longer than `max_idle` seconds
    pub fn sweep(&self, now: f64, max_idle: f64) {
        let before = self.states.len();
        self.states
            .retain(|_, state| now - state.lock().last_activity() <= max_idle);
        let removed = before - self.states.len();
        if removed > 0 {
            debug!(removed, "Swept idle rate limit state");
        }
    }

    /// Drop all state
    pub fn clear(&self) {
        self.states.clear();
    }

    fn check_inner(&self, key: &str, config: &RateLimitConfig, now: f64) -> RateLimitDecision {
        let entry = self
            .states
            .entry(key.to_string())
            .or_insert_with(|| Mutex::new(KeyState::new(config, now)));

        let mut state = entry.lock();

        // A config change (e.g. an API-key override switching algorithms)
        // restarts accounting for the key.
        if !state.matches(config.algorithm) {
            *state = KeyState::new(config, now);
        }

        match &mut *state {
            KeyState::Sliding { timestamps } => check_sliding(timestamps, config, now),
            KeyState::Bucket {
                tokens,
                last_refill,
            } => check_bucket(tokens, last_refill, config, now),
            KeyState::Fixed {
                window_start,
                count,
            } => check_fixed(window_start, count, config, now),
        }
    }
}

impl Default for MemoryRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimiter {
    async fn check(
        &self,
        key: &str,
        config: &RateLimitConfig,
        now: f64,
    ) -> GatewayResult<RateLimitDecision> {
        let decision = self.check_inner(key, config, now);
        if decision.allowed {
            debug!(
                key = %key,
                algorithm = ?config.algorithm,
                remaining = decision.remaining,
                "Rate limit check passed"
            );
        } else {
            warn!(
                key = %key,
                algorithm = ?config.algorithm,
                limit = decision.limit,
                reset = decision.reset,
                "Rate limit exceeded"
            );
        }
        Ok(decision)
    }
}

/// Sliding window: count admissions in the trailing 60s ending at `now`
fn check_sliding(
    timestamps: &mut VecDeque<f64>,
    config: &RateLimitConfig,
    now: f64,
) -> RateLimitDecision {
    let limit = config.requests_per_minute;

    // Lazily prune entries that aged out of the window.
    while timestamps
        .front()
        .is_some_and(|&t| t <= now - WINDOW_SECS)
    {
        timestamps.pop_front();
    }

    let count = timestamps.len();
    if (count as u64) < u64::from(limit) {
        timestamps.push_back(now);
        let oldest = timestamps.front().copied().unwrap_or(now);
        let used = u32::try_from(count).unwrap_or(u32::MAX);
        RateLimitDecision::allow(
            limit.saturating_sub(used).saturating_sub(1),
            limit,
            oldest + WINDOW_SECS,
        )
    } else {
        let reset = timestamps
            .front()
            .map_or(now + WINDOW_SECS, |&oldest| oldest + WINDOW_SECS);
        RateLimitDecision::deny(limit, reset)
    }
}

/// Token bucket: continuous refill capped at `burst_size`
fn check_bucket(
    tokens: &mut f64,
    last_refill: &mut f64,
    config: &RateLimitConfig,
    now: f64,
) -> RateLimitDecision {
    let capacity = f64::from(config.burst_size);
    let rate = config.refill_rate();

    let elapsed = (now - *last_refill).max(0.0);
    *tokens = (*tokens + elapsed * rate).min(capacity);
    *last_refill = now;

    if *tokens >= 1.0 {
        *tokens -= 1.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let remaining = tokens.floor().max(0.0) as u32;
        RateLimitDecision::allow(remaining, config.requests_per_minute, now)
            .with_bucket(config.burst_size, rate)
    } else {
        let reset = if rate > 0.0 {
            now + (1.0 - *tokens) / rate
        } else {
            now + WINDOW_SECS
        };
        RateLimitDecision::deny(config.requests_per_minute, reset)
            .with_bucket(config.burst_size, rate)
    }
}

/// Fixed window: counter resets exactly at aligned 60s boundaries
fn check_fixed(
    window_start: &mut f64,
    count: &mut u32,
    config: &RateLimitConfig,
    now: f64,
) -> RateLimitDecision {
    let limit = config.requests_per_minute;
    let boundary = window_boundary(now);

    if (*window_start - boundary).abs() > f64::EPSILON {
        *window_start = boundary;
        *count = 0;
    }

    let reset = boundary + WINDOW_SECS;
    if *count < limit {
        *count += 1;
        RateLimitDecision::allow(limit - *count, limit, reset)
    } else {
        RateLimitDecision::deny(limit, reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const T0: f64 = 1_700_000_000.0;

    async fn check(
        limiter: &MemoryRateLimiter,
        key: &str,
        config: &RateLimitConfig,
        now: f64,
    ) -> RateLimitDecision {
        limiter.check(key, config, now).await.expect("memory check")
    }

    #[tokio::test]
    async fn test_sliding_window_seven_requests_one_second_apart() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::per_minute(5);

        let mut remaining = Vec::new();
        for i in 0..7 {
            let decision = check(&limiter, "client", &config, T0 + f64::from(i)).await;
            if i < 5 {
                assert!(decision.allowed, "request {i} should be admitted");
                remaining.push(decision.remaining);
            } else {
                assert!(!decision.allowed, "request {i} should be denied");
            }
        }
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);
    }

    #[tokio::test]
    async fn test_sliding_window_capacity_restored_as_oldest_ages_out() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::per_minute(2);

        assert!(check(&limiter, "k", &config, T0).await.allowed);
        assert!(check(&limiter, "k", &config, T0 + 30.0).await.allowed);
        assert!(!check(&limiter, "k", &config, T0 + 59.0).await.allowed);

        // The request at T0 has aged past the trailing window: one unit back.
        assert!(check(&limiter, "k", &config, T0 + 60.5).await.allowed);
        assert!(!check(&limiter, "k", &config, T0 + 61.0).await.allowed);
    }

    #[tokio::test]
    async fn test_sliding_window_reset_is_oldest_plus_window() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::per_minute(3);

        let first = check(&limiter, "k", &config, T0).await;
        assert!((first.reset - (T0 + 60.0)).abs() < 1e-9);

        let second = check(&limiter, "k", &config, T0 + 10.0).await;
        assert!((second.reset - (T0 + 60.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_zero_limit_always_denies() {
        let limiter = MemoryRateLimiter::new();
        for config in [
            RateLimitConfig::per_minute(0),
            RateLimitConfig::fixed_window(0),
        ] {
            let decision = check(&limiter, "k", &config, T0).await;
            assert!(!decision.allowed);
        }
    }

    #[tokio::test]
    async fn test_huge_limit_admits_without_overflow() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::per_minute(u32::MAX);

        let decision = check(&limiter, "k", &config, T0).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, u32::MAX - 1);
    }

    #[tokio::test]
    async fn test_token_bucket_burst_then_denial_at_same_instant() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::token_bucket(60, 10);

        for i in 0..12 {
            let decision = check(&limiter, "k", &config, T0).await;
            if i < 10 {
                assert!(decision.allowed, "request {i} should be admitted");
                assert_eq!(decision.remaining, 10 - i - 1);
            } else {
                assert!(!decision.allowed, "request {i} should be denied");
            }
            assert_eq!(decision.burst_size, Some(10));
        }
    }

    #[tokio::test]
    async fn test_token_bucket_refills_one_token_after_interval() {
        let limiter = MemoryRateLimiter::new();
        // 60/min = 1 token/sec
        let config = RateLimitConfig::token_bucket(60, 2);

        assert!(check(&limiter, "k", &config, T0).await.allowed);
        assert!(check(&limiter, "k", &config, T0).await.allowed);
        assert!(!check(&limiter, "k", &config, T0).await.allowed);

        // Exactly one token accrues over one second.
        assert!(check(&limiter, "k", &config, T0 + 1.0).await.allowed);
        assert!(!check(&limiter, "k", &config, T0 + 1.0).await.allowed);
    }

    #[tokio::test]
    async fn test_token_bucket_never_exceeds_capacity() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::token_bucket(600, 5);

        for _ in 0..5 {
            assert!(check(&limiter, "k", &config, T0).await.allowed);
        }
        assert!(!check(&limiter, "k", &config, T0).await.allowed);

        // A week of idle refill still caps at burst_size tokens.
        let later = T0 + 7.0 * 86_400.0;
        for i in 0..5 {
            let decision = check(&limiter, "k", &config, later).await;
            assert!(decision.allowed, "request {i} should be admitted");
        }
        assert!(!check(&limiter, "k", &config, later).await.allowed);
    }

    #[tokio::test]
    async fn test_token_bucket_reports_refill_metadata() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::token_bucket(120, 4);

        let decision = check(&limiter, "k", &config, T0).await;
        assert_eq!(decision.burst_size, Some(4));
        assert!((decision.refill_rate.expect("rate") - 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_fixed_window_scenario() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::fixed_window(3);
        let base = 1_700_000_100.0; // 60s-aligned

        for i in 0..5 {
            let decision = check(&limiter, "k", &config, base + f64::from(i)).await;
            assert_eq!(decision.allowed, i < 3, "request {i}");
        }

        // Next aligned boundary restores full capacity.
        let decision = check(&limiter, "k", &config, base + 60.0).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn test_fixed_window_boundary_is_aligned_not_trailing() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::fixed_window(1);

        // 1_700_000_099 and 1_700_000_101 straddle the boundary at ...100.
        assert!(check(&limiter, "k", &config, 1_700_000_099.0).await.allowed);
        assert!(check(&limiter, "k", &config, 1_700_000_101.0).await.allowed);
        assert!(!check(&limiter, "k", &config, 1_700_000_102.0).await.allowed);
    }

    #[tokio::test]
    async fn test_fixed_window_reset_metadata() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::fixed_window(10);

        let decision = check(&limiter, "k", &config, 1_700_000_130.0).await;
        assert!((decision.reset - 1_700_000_160.0).abs() < 1e-9);
        assert_eq!(decision.remaining, 9);
    }

    #[tokio::test]
    async fn test_keys_are_isolated() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::per_minute(1);

        assert!(check(&limiter, "alice", &config, T0).await.allowed);
        assert!(!check(&limiter, "alice", &config, T0).await.allowed);

        // Exhausting alice leaves bob untouched.
        assert!(check(&limiter, "bob", &config, T0).await.allowed);
    }

    #[tokio::test]
    async fn test_algorithm_change_restarts_key_state() {
        let limiter = MemoryRateLimiter::new();
        let sliding = RateLimitConfig::per_minute(1);
        let bucket = RateLimitConfig::token_bucket(60, 3);

        assert!(check(&limiter, "k", &sliding, T0).await.allowed);
        assert!(!check(&limiter, "k", &sliding, T0).await.allowed);

        let decision = check(&limiter, "k", &bucket, T0).await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_double_admit() {
        let limiter = Arc::new(MemoryRateLimiter::new());
        let config = RateLimitConfig::per_minute(10);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..40 {
            let limiter = Arc::clone(&limiter);
            tasks.spawn(async move {
                limiter
                    .check("shared", &config, T0)
                    .await
                    .expect("memory check")
                    .allowed
            });
        }

        let mut admitted = 0;
        while let Some(allowed) = tasks.join_next().await {
            if allowed.expect("join") {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }

    #[tokio::test]
    async fn test_sweep_drops_idle_keys() {
        let limiter = MemoryRateLimiter::new();
        let config = RateLimitConfig::per_minute(10);

        check(&limiter, "old", &config, T0).await;
        check(&limiter, "fresh", &config, T0 + 500.0).await;
        assert_eq!(limiter.key_count(), 2);

        limiter.sweep(T0 + 600.0, 300.0);
        assert_eq!(limiter.key_count(), 1);
    }
}
