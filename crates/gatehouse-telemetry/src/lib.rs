//! # Gatehouse Telemetry
//!
//! Observability for the gatehouse gateway:
//! - Structured logging initialization (JSON, pretty, or compact)
//! - Prometheus counters for admission decisions and cache traffic

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
pub use metrics::{Metrics, MetricsSnapshot};
