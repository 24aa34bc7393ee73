//! # Gatehouse Routing
//!
//! Path-to-backend route table with longest-prefix matching.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod router;

pub use router::Router;
