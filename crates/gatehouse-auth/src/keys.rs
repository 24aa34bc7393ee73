//! API key management.

use dashmap::DashMap;
use gatehouse_core::{GatewayRequest, RateLimitConfig};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Prefix identifying gatehouse-issued keys
pub const KEY_PREFIX: &str = "gh_";

/// Random characters following the prefix
const KEY_RANDOM_LEN: usize = 32;

/// A stored API key record. Only `active` changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    /// The opaque key string
    pub key: String,
    /// Human-readable owner name
    pub name: String,
    /// Whether the key is currently accepted
    pub active: bool,
    /// Per-key rate limit override; `None` falls back to the route default
    pub rate_limit: Option<RateLimitConfig>,
}

/// Issues and validates opaque API keys
pub struct ApiKeyManager {
    records: DashMap<String, ApiKeyRecord>,
}

impl ApiKeyManager {
    /// Create an empty manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    /// Create a new API key and return the key string
    ///
    /// The key is a prefixed random token, unique across the manager.
    pub fn create_api_key(
        &self,
        name: impl Into<String>,
        rate_limit: Option<RateLimitConfig>,
    ) -> String {
        let name = name.into();
        let key = loop {
            let candidate = generate_key();
            // Collisions are vanishingly rare; retry keeps keys unique anyway.
            if !self.records.contains_key(&candidate) {
                break candidate;
            }
        };

        self.records.insert(
            key.clone(),
            ApiKeyRecord {
                key: key.clone(),
                name: name.clone(),
                active: true,
                rate_limit,
            },
        );
        info!(name = %name, "API key created");
        key
    }

    /// Seed a known key, e.g. a bootstrap key from configuration
    pub fn seed_key(
        &self,
        key: impl Into<String>,
        name: impl Into<String>,
        rate_limit: Option<RateLimitConfig>,
    ) {
        let key = key.into();
        let name = name.into();
        info!(name = %name, "Bootstrap API key seeded");
        self.records.insert(
            key.clone(),
            ApiKeyRecord {
                key,
                name,
                active: true,
                rate_limit,
            },
        );
    }

    /// Look up an active key; unknown and inactive keys are both `None`
    #[must_use]
    pub fn validate_api_key(&self, key: &str) -> Option<ApiKeyRecord> {
        match self.records.get(key) {
            Some(record) if record.active => Some(record.clone()),
            Some(_) => {
                debug!("Inactive API key presented");
                None
            }
            None => None,
        }
    }

    /// Deactivate a key; returns false if the key is unknown
    pub fn deactivate(&self, key: &str) -> bool {
        match self.records.get_mut(key) {
            Some(mut record) => {
                record.active = false;
                info!(name = %record.name, "API key deactivated");
                true
            }
            None => false,
        }
    }

    /// Number of stored keys, active or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no keys are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for ApiKeyManager {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_key() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{KEY_PREFIX}{random}")
}

/// Pull the API key from a request: `x-api-key` first, then
/// `authorization: Bearer <key>`.
#[must_use]
pub fn extract_api_key(request: &GatewayRequest) -> Option<String> {
    if let Some(key) = request.header("x-api-key") {
        if !key.is_empty() {
            return Some(key.to_string());
        }
    }

    request
        .header("authorization")
        .and_then(|value| value.strip_prefix("Bearer "))
        .filter(|key| !key.is_empty())
        .map(String::from)
}
