//! TTL-keyed response cache for idempotent routes.
//!
//! Keys combine the matched route with the request identity, so two requests
//! for different sub-paths of one route cache independently. Entries expire
//! at `stored_at + route.cache_ttl` and are evicted lazily on read.

use dashmap::DashMap;
use gatehouse_core::{GatewayRequest, GatewayResponse, Route};
use tracing::debug;

/// Cache key derived from route and request identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    route_path: String,
    method: String,
    request_path: String,
}

impl CacheKey {
    /// Build the key for a request matched to a route
    #[must_use]
    pub fn new(route: &Route, request: &GatewayRequest) -> Self {
        Self {
            route_path: route.path.clone(),
            method: request.method.to_string(),
            request_path: request.path.clone(),
        }
    }
}

struct CacheEntry {
    response: GatewayResponse,
    expires_at: f64,
}

/// In-memory response cache with per-route TTLs
pub struct ResponseCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl ResponseCache {
    /// Create an empty cache
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Get a non-expired response, evicting the entry if it expired
    #[must_use]
    pub fn get(&self, key: &CacheKey, now: f64) -> Option<GatewayResponse> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.expires_at > now => {
                debug!(path = %key.request_path, "Cache hit");
                return Some(entry.response.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(key);
            debug!(path = %key.request_path, "Cache entry expired");
        }
        None
    }

    /// Store a response until `now + ttl_secs`; a zero TTL disables caching
    pub fn put(&self, key: CacheKey, response: GatewayResponse, now: f64, ttl_secs: u64) {
        if ttl_secs == 0 {
            return;
        }
        #[allow(clippy::cast_precision_loss)]
        let expires_at = now + ttl_secs as f64;
        debug!(path = %key.request_path, ttl_secs, "Response cached");
        self.entries.insert(key, CacheEntry { response, expires_at });
    }

    /// Drop entries that expired before `now`
    pub fn purge_expired(&self, now: f64) {
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Number of live entries (including not-yet-purged expired ones)
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop everything
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}
