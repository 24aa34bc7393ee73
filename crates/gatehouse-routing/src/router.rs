//! Route table with longest-prefix resolution.
//!
//! Routes are registered by exact path and resolved by longest-prefix match:
//! of all registered paths that prefix the request path, the longest wins.
//! An exact-path registration is its own prefix and therefore beats any
//! shorter one.

use gatehouse_core::{Route, RouteOptions};
use parking_lot::RwLock;
use tracing::{debug, info};

/// Path-to-backend route table
pub struct Router {
    /// Registration order is preserved; later entries win length ties
    routes: RwLock<Vec<Route>>,
}

impl Router {
    /// Create an empty router
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: RwLock::new(Vec::new()),
        }
    }

    /// Register a route, overwriting any existing registration for `path`
    pub fn register(
        &self,
        path: impl Into<String>,
        backend_url: impl Into<String>,
        options: RouteOptions,
    ) {
        let route = Route::new(path, backend_url, options);
        let mut routes = self.routes.write();
        routes.retain(|r| r.path != route.path);
        info!(
            path = %route.path,
            backend = %route.backend_url,
            require_auth = route.require_auth,
            "Route registered"
        );
        routes.push(route);
    }

    /// Remove a route by exact path, returning it if present
    pub fn deregister(&self, path: &str) -> Option<Route> {
        let mut routes = self.routes.write();
        let index = routes.iter().position(|r| r.path == path)?;
        let route = routes.remove(index);
        info!(path = %path, "Route deregistered");
        Some(route)
    }

    /// Resolve a request path to the route with the longest matching prefix
    ///
    /// Returns `None` when no registered path prefixes `request_path`. Length
    /// ties break toward the most recent registration.
    #[must_use]
    pub fn resolve(&self, request_path: &str) -> Option<Route> {
        let routes = self.routes.read();
        let matched = routes
            .iter()
            .enumerate()
            .filter(|(_, r)| request_path.starts_with(r.path.as_str()))
            .max_by_key(|(index, r)| (r.path.len(), *index))
            .map(|(_, r)| r.clone());

        match &matched {
            Some(route) => debug!(
                request_path = %request_path,
                route = %route.path,
                backend = %route.backend_url,
                "Route resolved"
            ),
            None => debug!(request_path = %request_path, "No matching route"),
        }

        matched
    }

    /// Snapshot of all registered routes
    #[must_use]
    pub fn routes(&self) -> Vec<Route> {
        self.routes.read().clone()
    }

    /// Number of registered routes
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Whether no routes are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatehouse_core::RateLimitConfig;

    fn create_test_router() -> Router {
        let router = Router::new();
        router.register("/api", "http://api.internal", RouteOptions::new());
        router.register("/api/users", "http://users.internal", RouteOptions::new());
        router.register("/api/users/admin", "http://admin.internal", RouteOptions::new());
        router
    }

    #[test]
    fn test_longest_prefix_wins() {
        let router = create_test_router();

        let route = router.resolve("/api/users/admin/audit").expect("match");
        assert_eq!(route.backend_url, "http://admin.internal");

        let route = router.resolve("/api/users/42").expect("match");
        assert_eq!(route.backend_url, "http://users.internal");

        let route = router.resolve("/api/orders").expect("match");
        assert_eq!(route.backend_url, "http://api.internal");
    }

    #[test]
    fn test_exact_path_beats_shorter_prefix() {
        let router = create_test_router();

        let route = router.resolve("/api/users").expect("match");
        assert_eq!(route.backend_url, "http://users.internal");
    }

    #[test]
    fn test_no_match() {
        let router = create_test_router();
        assert!(router.resolve("/health").is_none());
        assert!(router.resolve("/ap").is_none());
    }

    #[test]
    fn test_register_overwrites_existing_path() {
        let router = Router::new();
        router.register(
            "/api",
            "http://old.internal",
            RouteOptions::new().with_rate_limit(RateLimitConfig::per_minute(10)),
        );
        router.register(
            "/api",
            "http://new.internal",
            RouteOptions::new().with_rate_limit(RateLimitConfig::per_minute(99)),
        );

        assert_eq!(router.len(), 1);
        let route = router.resolve("/api/anything").expect("match");
        assert_eq!(route.backend_url, "http://new.internal");
        assert_eq!(route.rate_limit.requests_per_minute, 99);
    }

    #[test]
    fn test_deregister() {
        let router = create_test_router();
        assert!(router.deregister("/api/users/admin").is_some());
        assert!(router.deregister("/api/users/admin").is_none());

        let route = router.resolve("/api/users/admin/audit").expect("match");
        assert_eq!(route.backend_url, "http://users.internal");
    }

    #[test]
    fn test_options_carried_onto_route() {
        let router = Router::new();
        router.register(
            "/secure",
            "http://secure.internal",
            RouteOptions::new().with_auth().with_cache_ttl(30),
        );

        let route = router.resolve("/secure/data").expect("match");
        assert!(route.require_auth);
        assert_eq!(route.cache_ttl, 30);
    }
}
