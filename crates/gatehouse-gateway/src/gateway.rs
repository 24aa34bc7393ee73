//! Per-request orchestration.
//!
//! Flow: route resolution → API key validation (protected routes) → rate
//! limit → middleware chain → cache read → circuit-broken backend dispatch →
//! cache write → metrics. Authentication and rate limiting fail fast, before
//! any middleware or backend cost is incurred.

use crate::backend::BackendTransport;
use crate::middleware::{Middleware, MiddlewarePipeline};
use arc_swap::ArcSwap;
use gatehouse_auth::{extract_api_key, ApiKeyManager, ApiKeyRecord};
use gatehouse_config::GatewayConfig;
use gatehouse_core::{
    ApiErrorResponse, Clock, GatewayError, GatewayRequest, GatewayResponse, GatewayResult,
    SystemClock,
};
use gatehouse_resilience::{
    CacheKey, CircuitBreakerConfig, CircuitBreakerManager, MemoryRateLimiter, RateLimitStore,
    RedisRateLimiter, ResponseCache,
};
use gatehouse_routing::Router;
use gatehouse_telemetry::{Metrics, MetricsSnapshot};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The admission-control gateway
pub struct Gateway {
    config: Arc<ArcSwap<GatewayConfig>>,
    router: Arc<Router>,
    limiter: Arc<dyn RateLimitStore>,
    breakers: Arc<CircuitBreakerManager>,
    api_keys: Arc<ApiKeyManager>,
    pipeline: MiddlewarePipeline,
    cache: Arc<ResponseCache>,
    metrics: Arc<Metrics>,
    transport: Arc<dyn BackendTransport>,
    clock: Arc<dyn Clock>,
}

impl Gateway {
    /// Start building a gateway
    #[must_use]
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    /// Initialize from configuration: register routes, seed bootstrap keys,
    /// and connect the distributed limiter backend when configured
    ///
    /// # Errors
    /// Returns a configuration error if the redis URL is invalid
    pub async fn setup(&mut self) -> GatewayResult<()> {
        let config = self.config.load_full();

        for route in &config.routes {
            self.router
                .register(&route.path, &route.backend_url, route.options());
        }

        for key in &config.security.bootstrap_keys {
            self.api_keys.seed_key(&key.key, &key.name, key.rate_limit);
        }

        if let Some(url) = &config.rate_limit.redis_url {
            let limiter = RedisRateLimiter::new(url, config.rate_limit.key_prefix.clone())?;
            self.limiter = Arc::new(limiter);
            info!(url = %url, "Distributed rate limiting enabled");
        }

        info!(
            routes = config.routes.len(),
            bootstrap_keys = config.security.bootstrap_keys.len(),
            "Gateway ready"
        );
        Ok(())
    }

    /// Release per-request state: cached responses and the cache-size gauge
    pub async fn cleanup(&self) {
        self.cache.clear();
        self.metrics.set_cache_size(0);
        info!("Gateway cleaned up");
    }

    /// Handle one inbound request; every failure maps to an error response
    #[instrument(skip(self, request), fields(path = %request.path, method = %request.method))]
    pub async fn handle(&self, request: &GatewayRequest) -> GatewayResponse {
        let now = self.clock.now();
        self.metrics.record_request();

        match self.process(request, now).await {
            Ok(response) => response,
            Err(error) => self.error_response(&error),
        }
    }

    async fn process(
        &self,
        request: &GatewayRequest,
        now: f64,
    ) -> GatewayResult<GatewayResponse> {
        let route = self
            .router
            .resolve(&request.path)
            .ok_or_else(|| GatewayError::route_not_found(&request.path))?;

        let key_record = if route.require_auth {
            Some(self.authenticate(request)?)
        } else {
            None
        };

        // Per-key override beats the route default.
        let limit_config = key_record
            .as_ref()
            .and_then(|record| record.rate_limit)
            .unwrap_or(route.rate_limit);

        let identity = key_record
            .as_ref()
            .map(|record| record.key.clone())
            .or_else(|| extract_api_key(request))
            .or_else(|| request.remote_addr.clone())
            .unwrap_or_else(|| "anonymous".to_string());
        let limiter_key = format!("{identity}:{}", route.path);

        let decision = self.limiter.check(&limiter_key, &limit_config, now).await?;
        if !decision.allowed {
            self.metrics.record_rate_limited();
            return Err(GatewayError::rate_limit(decision.limit, decision.reset));
        }

        if let Some(response) = self.pipeline.run(request, &route) {
            return Ok(response);
        }

        let cache_key = CacheKey::new(&route, request);
        if route.cache_ttl > 0 {
            if let Some(cached) = self.cache.get(&cache_key, now) {
                self.metrics.record_cache_hit();
                return Ok(cached);
            }
            self.metrics.record_cache_miss();
        }

        let transport = Arc::clone(&self.transport);
        let breaker = self.breakers.get_or_create(&route.backend_url);
        let backend_url = route.backend_url.clone();
        let result = breaker
            .call(now, || async move {
                transport.dispatch(&backend_url, request).await
            })
            .await;

        match result {
            Ok(response) => {
                self.metrics.record_success();
                if route.cache_ttl > 0 && response.is_success() {
                    self.cache
                        .put(cache_key, response.clone(), now, route.cache_ttl);
                    self.metrics.set_cache_size(self.cache.len());
                }
                Ok(response
                    .with_header("x-ratelimit-remaining", decision.remaining.to_string()))
            }
            Err(error) => {
                self.metrics.record_failure();
                Err(error)
            }
        }
    }

    fn authenticate(&self, request: &GatewayRequest) -> GatewayResult<ApiKeyRecord> {
        let key = extract_api_key(request)
            .ok_or_else(|| GatewayError::authentication("missing API key"))?;

        self.api_keys.validate_api_key(&key).ok_or_else(|| {
            debug!("Rejecting unknown or inactive API key");
            GatewayError::authentication("unknown or inactive API key")
        })
    }

    fn error_response(&self, error: &GatewayError) -> GatewayResponse {
        let status = error.status_code();
        if status.is_server_error() {
            warn!(error = %error, "Request failed");
        }

        let body = ApiErrorResponse::from(error);
        let mut response = GatewayResponse::json(status, &body)
            .unwrap_or_else(|_| GatewayResponse::new(status, error.to_string()));

        if let GatewayError::RateLimitExceeded { limit, reset } = error {
            response = response
                .with_header("x-ratelimit-limit", limit.to_string())
                .with_header("x-ratelimit-remaining", "0")
                .with_header("x-ratelimit-reset", format!("{reset:.0}"));
        }
        response
    }

    /// Snapshot of the gateway counters, with the cache-size gauge refreshed
    #[must_use]
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.set_cache_size(self.cache.len());
        self.metrics.snapshot()
    }

    /// Prometheus text exposition of all counters
    #[must_use]
    pub fn export_metrics(&self) -> String {
        self.metrics.set_cache_size(self.cache.len());
        self.metrics.export()
    }

    /// The route table, for registration at runtime
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// The API key manager, for dynamic key issuance
    #[must_use]
    pub fn api_keys(&self) -> &ApiKeyManager {
        &self.api_keys
    }

    /// Circuit breaker states per backend target
    #[must_use]
    pub fn breakers(&self) -> &CircuitBreakerManager {
        &self.breakers
    }

    /// Current configuration
    #[must_use]
    pub fn current_config(&self) -> Arc<GatewayConfig> {
        self.config.load_full()
    }

    /// Swap in a new configuration; affects future `setup` calls and readers
    pub fn update_config(&self, config: GatewayConfig) {
        self.config.store(Arc::new(config));
    }
}

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    config: GatewayConfig,
    transport: Option<Arc<dyn BackendTransport>>,
    clock: Option<Arc<dyn Clock>>,
    limiter: Option<Arc<dyn RateLimitStore>>,
    pipeline: MiddlewarePipeline,
}

impl GatewayBuilder {
    /// Create a builder with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            transport: None,
            clock: None,
            limiter: None,
            pipeline: MiddlewarePipeline::new(),
        }
    }

    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the backend transport (required)
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn BackendTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Override the clock; defaults to [`SystemClock`]
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Override the rate limiter backend; defaults to the in-memory limiter
    /// (or redis when configured, chosen during `setup`)
    #[must_use]
    pub fn rate_limiter(mut self, limiter: Arc<dyn RateLimitStore>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Append a middleware to the pipeline
    #[must_use]
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.pipeline.push(middleware);
        self
    }

    /// Build the gateway
    ///
    /// # Errors
    /// Returns a configuration error if no transport was provided or the
    /// metrics registry cannot be created
    pub fn build(self) -> GatewayResult<Gateway> {
        let transport = self
            .transport
            .ok_or_else(|| GatewayError::configuration("backend transport is required"))?;

        let breaker_config = CircuitBreakerConfig {
            failure_threshold: self.config.circuit_breaker.failure_threshold,
            success_threshold: self.config.circuit_breaker.success_threshold,
            recovery_timeout: self.config.circuit_breaker.recovery_timeout,
        };

        let metrics = Metrics::new()
            .map_err(|e| GatewayError::internal(format!("metrics registry: {e}")))?;

        Ok(Gateway {
            config: Arc::new(ArcSwap::new(Arc::new(self.config))),
            router: Arc::new(Router::new()),
            limiter: self
                .limiter
                .unwrap_or_else(|| Arc::new(MemoryRateLimiter::new())),
            breakers: Arc::new(CircuitBreakerManager::with_config(breaker_config)),
            api_keys: Arc::new(ApiKeyManager::new()),
            pipeline: self.pipeline,
            cache: Arc::new(ResponseCache::new()),
            metrics: Arc::new(metrics),
            transport,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct NullTransport;

    #[async_trait]
    impl BackendTransport for NullTransport {
        async fn dispatch(
            &self,
            _backend_url: &str,
            _request: &GatewayRequest,
        ) -> GatewayResult<GatewayResponse> {
            Ok(GatewayResponse::ok("null"))
        }
    }

    #[test]
    fn test_build_requires_transport() {
        let result = Gateway::builder().build();
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
    }

    #[test]
    fn test_build_with_defaults() {
        let gateway = Gateway::builder()
            .transport(Arc::new(NullTransport))
            .build()
            .expect("build");

        assert!(gateway.router().is_empty());
        assert!(gateway.api_keys().is_empty());
        assert_eq!(gateway.metrics().requests_total, 0);
    }

    #[test]
    fn test_config_hot_swap() {
        let gateway = Gateway::builder()
            .transport(Arc::new(NullTransport))
            .build()
            .expect("build");

        let mut config = GatewayConfig::default();
        config.server.port = 9999;
        gateway.update_config(config);

        assert_eq!(gateway.current_config().server.port, 9999);
    }
}
