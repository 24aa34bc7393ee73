//! Prometheus counters for gateway decision points.
//!
//! Six monotonic counters plus a cache-size gauge, registered on a private
//! registry. Counters are only incremented by the gateway at the decision
//! they describe, so a snapshot is a faithful account of admission outcomes.

use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;

/// Metrics registry and collectors for the gateway
pub struct Metrics {
    registry: Registry,
    requests_total: IntCounter,
    requests_success: IntCounter,
    requests_failed: IntCounter,
    requests_rate_limited: IntCounter,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    cache_size: IntGauge,
}

/// Point-in-time view of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    /// Requests that entered the gateway
    pub requests_total: u64,
    /// Requests that completed with a backend or cached response
    pub requests_success: u64,
    /// Requests that failed at dispatch (including circuit-open rejections)
    pub requests_failed: u64,
    /// Requests denied by the rate limiter
    pub requests_rate_limited: u64,
    /// Cache lookups that returned a live entry
    pub cache_hits: u64,
    /// Cache lookups that found nothing usable
    pub cache_misses: u64,
    /// Current number of cached responses
    pub cache_size: u64,
}

impl Metrics {
    /// Create a metrics instance with all collectors registered
    ///
    /// # Errors
    /// Returns an error if a collector cannot be registered
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = IntCounter::new(
            "gatehouse_requests_total",
            "Total number of requests entering the gateway",
        )?;
        let requests_success = IntCounter::new(
            "gatehouse_requests_success",
            "Requests completed successfully",
        )?;
        let requests_failed = IntCounter::new(
            "gatehouse_requests_failed",
            "Requests failed at backend dispatch",
        )?;
        let requests_rate_limited = IntCounter::new(
            "gatehouse_requests_rate_limited",
            "Requests denied by the rate limiter",
        )?;
        let cache_hits = IntCounter::new("gatehouse_cache_hits", "Response cache hits")?;
        let cache_misses = IntCounter::new("gatehouse_cache_misses", "Response cache misses")?;
        let cache_size = IntGauge::new("gatehouse_cache_size", "Cached responses currently held")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(requests_success.clone()))?;
        registry.register(Box::new(requests_failed.clone()))?;
        registry.register(Box::new(requests_rate_limited.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(cache_size.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            requests_success,
            requests_failed,
            requests_rate_limited,
            cache_hits,
            cache_misses,
            cache_size,
        })
    }

    /// Count an inbound request
    pub fn record_request(&self) {
        self.requests_total.inc();
    }

    /// Count a successful completion
    pub fn record_success(&self) {
        self.requests_success.inc();
    }

    /// Count a dispatch failure
    pub fn record_failure(&self) {
        self.requests_failed.inc();
    }

    /// Count a rate-limit denial
    pub fn record_rate_limited(&self) {
        self.requests_rate_limited.inc();
    }

    /// Count a cache hit
    pub fn record_cache_hit(&self) {
        self.cache_hits.inc();
    }

    /// Count a cache miss
    pub fn record_cache_miss(&self) {
        self.cache_misses.inc();
    }

    /// Update the cache-size gauge
    pub fn set_cache_size(&self, size: usize) {
        self.cache_size.set(i64::try_from(size).unwrap_or(i64::MAX));
    }

    /// Snapshot every counter, including the derived cache size
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_total: self.requests_total.get(),
            requests_success: self.requests_success.get(),
            requests_failed: self.requests_failed.get(),
            requests_rate_limited: self.requests_rate_limited.get(),
            cache_hits: self.cache_hits.get(),
            cache_misses: self.cache_misses.get(),
            cache_size: u64::try_from(self.cache_size.get()).unwrap_or_default(),
        }
    }

    /// Render all metrics in Prometheus text exposition format
    #[must_use]
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder
            .encode(&self.registry.gather(), &mut buffer)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
