//! Request middleware pipeline.
//!
//! An ordered, short-circuiting chain of interceptors. Each middleware sees
//! the request and its matched route; the first one returning a response
//! halts the chain and that response goes straight back to the client.

use gatehouse_core::{GatewayRequest, GatewayResponse, Route};
use http::{Method, StatusCode};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A request interceptor
pub trait Middleware: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Inspect the request; `Some(response)` short-circuits the chain
    fn evaluate(&self, request: &GatewayRequest, route: &Route) -> Option<GatewayResponse>;
}

/// Ordered, short-circuiting middleware chain
#[derive(Clone, Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    /// Create an empty pipeline
    #[must_use]
    pub fn new() -> Self {
        Self {
            middlewares: Vec::new(),
        }
    }

    /// Append a middleware; evaluation follows registration order
    pub fn push(&mut self, middleware: Arc<dyn Middleware>) {
        self.middlewares.push(middleware);
    }

    /// Number of registered middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Whether the pipeline is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }

    /// Run the chain; the first non-empty response wins
    #[must_use]
    pub fn run(&self, request: &GatewayRequest, route: &Route) -> Option<GatewayResponse> {
        for middleware in &self.middlewares {
            if let Some(response) = middleware.evaluate(request, route) {
                debug!(
                    middleware = %middleware.name(),
                    status = %response.status,
                    "Middleware short-circuited request"
                );
                return Some(response);
            }
        }
        None
    }
}

/// Rejects methods outside an allowlist with 405
pub struct MethodFilter {
    allowed: Vec<Method>,
}

impl MethodFilter {
    /// Allow only the given methods
    #[must_use]
    pub fn new(allowed: Vec<Method>) -> Self {
        Self { allowed }
    }
}

impl Middleware for MethodFilter {
    fn name(&self) -> &str {
        "method_filter"
    }

    fn evaluate(&self, request: &GatewayRequest, _route: &Route) -> Option<GatewayResponse> {
        if self.allowed.contains(&request.method) {
            None
        } else {
            Some(GatewayResponse::new(
                StatusCode::METHOD_NOT_ALLOWED,
                "method not allowed",
            ))
        }
    }
}

/// Answers 503 for every request while enabled
#[derive(Default)]
pub struct MaintenanceMode {
    enabled: AtomicBool,
}

impl MaintenanceMode {
    /// Create in the disabled state
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle maintenance mode
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

impl Middleware for MaintenanceMode {
    fn name(&self) -> &str {
        "maintenance_mode"
    }

    fn evaluate(&self, _request: &GatewayRequest, _route: &Route) -> Option<GatewayResponse> {
        if self.enabled.load(Ordering::SeqCst) {
            Some(GatewayResponse::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "gateway under maintenance",
            ))
        } else {
            None
        }
    }
}

/// Rejects requests from blocked client addresses with 403
pub struct IpBlocklist {
    blocked: HashSet<String>,
}

impl IpBlocklist {
    /// Block the given addresses
    #[must_use]
    pub fn new(blocked: impl IntoIterator<Item = String>) -> Self {
        Self {
            blocked: blocked.into_iter().collect(),
        }
    }
}

impl Middleware for IpBlocklist {
    fn name(&self) -> &str {
        "ip_blocklist"
    }

    fn evaluate(&self, request: &GatewayRequest, _route: &Route) -> Option<GatewayResponse> {
        let blocked = request
            .remote_addr
            .as_ref()
            .is_some_and(|addr| self.blocked.contains(addr));
        if blocked {
            Some(GatewayResponse::new(StatusCode::FORBIDDEN, "forbidden"))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::RouteOptions;

    fn route() -> Route {
        Route::new("/api", "http://api.internal", RouteOptions::new())
    }

    struct Tagger {
        tag: &'static str,
        fire: bool,
    }

    impl Middleware for Tagger {
        fn name(&self) -> &str {
            self.tag
        }

        fn evaluate(&self, _: &GatewayRequest, _: &Route) -> Option<GatewayResponse> {
            self.fire.then(|| GatewayResponse::ok(self.tag))
        }
    }

    #[test]
    fn test_empty_pipeline_passes_through() {
        let pipeline = MiddlewarePipeline::new();
        assert!(pipeline
            .run(&GatewayRequest::get("/api"), &route())
            .is_none());
    }

    #[test]
    fn test_first_responder_wins_in_registration_order() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.push(Arc::new(Tagger { tag: "first", fire: false }));
        pipeline.push(Arc::new(Tagger { tag: "second", fire: true }));
        pipeline.push(Arc::new(Tagger { tag: "third", fire: true }));

        let response = pipeline
            .run(&GatewayRequest::get("/api"), &route())
            .expect("short-circuit");
        assert_eq!(response.body, "second");
    }

    #[test]
    fn test_method_filter() {
        let filter = MethodFilter::new(vec![Method::GET, Method::POST]);

        assert!(filter.evaluate(&GatewayRequest::get("/api"), &route()).is_none());

        let denied = filter
            .evaluate(&GatewayRequest::new(Method::DELETE, "/api"), &route())
            .expect("denied");
        assert_eq!(denied.status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[test]
    fn test_maintenance_mode_toggles() {
        let maintenance = MaintenanceMode::new();
        let request = GatewayRequest::get("/api");

        assert!(maintenance.evaluate(&request, &route()).is_none());

        maintenance.set_enabled(true);
        let response = maintenance.evaluate(&request, &route()).expect("blocked");
        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

        maintenance.set_enabled(false);
        assert!(maintenance.evaluate(&request, &route()).is_none());
    }

    #[test]
    fn test_ip_blocklist() {
        let blocklist = IpBlocklist::new(["10.0.0.9".to_string()]);

        let blocked = GatewayRequest::get("/api").with_remote_addr("10.0.0.9");
        assert_eq!(
            blocklist.evaluate(&blocked, &route()).expect("blocked").status,
            StatusCode::FORBIDDEN
        );

        let allowed = GatewayRequest::get("/api").with_remote_addr("10.0.0.10");
        assert!(blocklist.evaluate(&allowed, &route()).is_none());

        // No remote address: nothing to match against.
        assert!(blocklist.evaluate(&GatewayRequest::get("/api"), &route()).is_none());
    }
}
