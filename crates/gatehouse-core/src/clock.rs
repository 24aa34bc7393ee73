//! Injectable wall clock.
//!
//! Every time-sensitive computation in the workspace takes an explicit
//! `now` timestamp (unix seconds). The gateway samples a [`Clock`] once per
//! request at the edge; nothing below it reads a hidden global clock, which
//! keeps window and refill math reproducible in tests.

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current unix timestamp in seconds
pub trait Clock: Send + Sync {
    /// Current unix time in seconds
    fn now(&self) -> f64;
}

/// Production clock backed by [`SystemTime`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default()
    }
}

/// Manually-advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<f64>,
}

impl ManualClock {
    /// Create a clock starting at the given unix time
    #[must_use]
    pub fn new(start: f64) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Advance the clock by `secs`
    pub fn advance(&self, secs: f64) {
        *self.now.lock() += secs;
    }

    /// Jump to an absolute time
    pub fn set(&self, now: f64) {
        *self.now.lock() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        *self.now.lock()
    }
}
