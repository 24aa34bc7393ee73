//! Circuit breaker for failing backend targets.
//!
//! One failure-driven state machine per target key. Consecutive failures in
//! Closed trip the breaker; Open rejects without invoking the wrapped
//! operation; after the recovery timeout a bounded number of trials probes
//! the target, and enough consecutive successes close it again. While
//! HalfOpen, exactly one trial may be in flight per target; concurrent
//! callers are rejected like Open until the trial resolves.

use dashmap::DashMap;
use gatehouse_core::{GatewayError, GatewayResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening
    pub failure_threshold: u32,
    /// Consecutive trial successes before closing
    pub success_threshold: u32,
    /// Time the breaker stays open before admitting trials
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }
}

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls execute normally
    Closed,
    /// Calls are rejected without invoking the operation
    Open,
    /// A limited number of trial calls probe the target
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: f64,
    trial_in_flight: bool,
}

/// Failure-driven state machine wrapping calls to one target
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Create a breaker for the named target
    #[must_use]
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                opened_at: 0.0,
                trial_in_flight: false,
            }),
        }
    }

    /// Target name this breaker guards
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, without advancing the Open→HalfOpen transition
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Consecutive failure count (observability)
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Execute `op` under the breaker at time `now`
    ///
    /// # Errors
    /// Returns [`GatewayError::CircuitOpen`] without invoking `op` while the
    /// breaker is open (or a trial is already in flight); otherwise
    /// re-raises whatever `op` returns.
    pub async fn call<T, F, Fut>(&self, now: f64, op: F) -> GatewayResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        self.try_acquire(now)?;

        let result = op().await;
        match &result {
            Ok(_) => self.on_success(),
            Err(error) => self.on_failure(now, error),
        }
        result
    }

    /// Admission decision; flips Open→HalfOpen when the timeout elapsed
    fn try_acquire(&self, now: f64) -> GatewayResult<()> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            if now - inner.opened_at >= self.config.recovery_timeout.as_secs_f64() {
                inner.state = CircuitState::HalfOpen;
                inner.consecutive_successes = 0;
                inner.trial_in_flight = false;
                info!(target = %self.name, "Circuit half-open, admitting trial calls");
            } else {
                debug!(target = %self.name, "Circuit open, rejecting call");
                return Err(GatewayError::circuit_open(&self.name));
            }
        }

        if inner.state == CircuitState::HalfOpen {
            if inner.trial_in_flight {
                debug!(target = %self.name, "Trial already in flight, rejecting call");
                return Err(GatewayError::circuit_open(&self.name));
            }
            inner.trial_in_flight = true;
        }

        Ok(())
    }

    fn on_success(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = false;
                inner.consecutive_successes += 1;
                if inner.consecutive_successes >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.consecutive_successes = 0;
                    info!(target = %self.name, "Circuit closed after successful trials");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn on_failure(&self, now: f64, error: &GatewayError) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = now;
                    warn!(
                        target = %self.name,
                        failures = inner.consecutive_failures,
                        error = %error,
                        "Circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.trial_in_flight = false;
                inner.state = CircuitState::Open;
                inner.opened_at = now;
                inner.consecutive_successes = 0;
                warn!(target = %self.name, error = %error, "Trial failed, circuit reopened");
            }
            CircuitState::Open => {}
        }
    }
}

/// One circuit breaker per backend target
pub struct CircuitBreakerManager {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
}

impl CircuitBreakerManager {
    /// Create a manager with default breaker configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(CircuitBreakerConfig::default())
    }

    /// Create a manager with custom breaker configuration
    #[must_use]
    pub fn with_config(config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
        }
    }

    /// Get or create the breaker for a target
    #[must_use]
    pub fn get_or_create(&self, target: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(target.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(target, self.config.clone()))
            })
            .clone()
    }

    /// Get the breaker for a target if it exists
    #[must_use]
    pub fn get(&self, target: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(target).map(|entry| Arc::clone(&entry))
    }

    /// Snapshot of every breaker's state
    #[must_use]
    pub fn all_states(&self) -> HashMap<String, CircuitState> {
        self.breakers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().state()))
            .collect()
    }
}

impl Default for CircuitBreakerManager {
    fn default() -> Self {
        Self::new()
    }
}
