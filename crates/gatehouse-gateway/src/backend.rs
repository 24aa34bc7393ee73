//! Backend transport seam.
//!
//! The gateway gates and wraps backend calls but never performs them; the
//! actual network dispatch (and any timeout or retry policy) belongs to the
//! transport implementation behind this trait.

use async_trait::async_trait;
use gatehouse_core::{GatewayRequest, GatewayResponse, GatewayResult};

/// Performs the actual call to a backend target
#[async_trait]
pub trait BackendTransport: Send + Sync {
    /// Dispatch `request` to `backend_url`
    ///
    /// # Errors
    /// Returns [`gatehouse_core::GatewayError::Backend`] when the backend
    /// call fails; the error is propagated verbatim to the gateway caller
    /// and counted as a circuit-breaker failure.
    async fn dispatch(
        &self,
        backend_url: &str,
        request: &GatewayRequest,
    ) -> GatewayResult<GatewayResponse>;
}
