//! # Gatehouse Gateway
//!
//! The composition root of the gatehouse workspace. Wires the router, rate
//! limiter, circuit breakers, API key manager, middleware pipeline, response
//! cache, and metrics into a single per-request admission flow in front of
//! an external backend transport.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod gateway;
pub mod middleware;

pub use backend::BackendTransport;
pub use gateway::{Gateway, GatewayBuilder};
pub use middleware::{
    IpBlocklist, MaintenanceMode, MethodFilter, Middleware, MiddlewarePipeline,
};
