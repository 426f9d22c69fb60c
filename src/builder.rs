//! Availability Service Builder
//!
//! Wires the store, cache layer, rate limiter, circuit breaker, resilient
//! upstream, aggregator and invalidation handlers into an
//! [`AvailabilityService`].
//!
//! # Example
//!
//! ```rust,ignore
//! use court_availability_cache::{AvailabilityServiceBuilder, Config};
//! use std::sync::Arc;
//!
//! let service = AvailabilityServiceBuilder::new()
//!     .with_config(Config::from_env())
//!     .with_upstream(Arc::new(MyProviderClient::new()))
//!     .build()
//!     .await?;
//! ```

use anyhow::{Result, bail};
use std::sync::Arc;
use tracing::info;

use crate::aggregator::AvailabilityAggregator;
use crate::cache_layer::CacheLayer;
use crate::circuit_breaker::CircuitBreaker;
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::invalidation::InvalidationHandlers;
use crate::metrics::{MetricsSink, NoopMetrics};
use crate::rate_limiter::RateLimiter;
use crate::source::AvailabilitySource;
use crate::traits::{AvailabilityUpstream, KeyValueStore};
use crate::upstream::ResilientUpstream;
use crate::AvailabilityService;

/// Name of the breaker guarding the provider
pub const UPSTREAM_BREAKER_NAME: &str = "availability-upstream";

/// Builder for [`AvailabilityService`]
///
/// Only the upstream client is required. Without an injected store, `build`
/// connects to Redis at `config.redis_url`.
#[derive(Default)]
pub struct AvailabilityServiceBuilder {
    config: Option<Config>,
    store: Option<Arc<dyn KeyValueStore>>,
    upstream: Option<Arc<dyn AvailabilityUpstream>>,
    metrics: Option<Arc<dyn MetricsSink>>,
    clock: Option<Arc<dyn Clock>>,
}

impl AvailabilityServiceBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit configuration instead of reading the environment
    #[must_use]
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Share an existing store (tests use `MemoryStore`)
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn with_upstream(mut self, upstream: Arc<dyn AvailabilityUpstream>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Build the service
    ///
    /// # Errors
    ///
    /// Returns an error if no upstream was given or the default Redis store
    /// cannot connect.
    pub async fn build(self) -> Result<AvailabilityService> {
        let Some(upstream) = self.upstream else {
            bail!("an upstream client is required to build the availability service");
        };
        let config = self.config.unwrap_or_else(Config::from_env);
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(NoopMetrics));
        let store = match self.store {
            Some(store) => store,
            None => default_store(&config).await?,
        };

        info!(
            store = store.name(),
            rpm = config.rate_limit.rpm,
            strategy = config.rate_limit.strategy.as_str(),
            failure_threshold = config.circuit_breaker.failure_threshold,
            "Building availability service"
        );

        let cache = Arc::new(CacheLayer::new(Arc::clone(&store), config.cache_ttl.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(
            Arc::clone(&store),
            config.rate_limit.clone(),
            Arc::clone(&clock),
        ));
        let circuit_breaker = Arc::new(CircuitBreaker::new(
            UPSTREAM_BREAKER_NAME,
            config.circuit_breaker.clone(),
        ));
        let resilient = Arc::new(ResilientUpstream::new(
            upstream,
            Arc::clone(&rate_limiter),
            Arc::clone(&circuit_breaker),
            metrics,
            config.aggregator.rate_limit_identifier.clone(),
        ));
        let source = AvailabilitySource::new(Arc::clone(&cache), resilient);
        let aggregator = Arc::new(AvailabilityAggregator::new(
            source,
            config.aggregator.clone(),
            clock,
        ));
        let invalidation = Arc::new(InvalidationHandlers::new(Arc::clone(&cache)));

        info!("Availability service ready");

        Ok(AvailabilityService {
            cache,
            rate_limiter,
            circuit_breaker,
            aggregator,
            invalidation,
        })
    }
}

#[cfg(feature = "redis")]
async fn default_store(config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    let store = crate::backends::RedisStore::with_url(&config.redis_url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn default_store(_config: &Config) -> Result<Arc<dyn KeyValueStore>> {
    tracing::warn!("Built without the redis feature, state is process-local");
    Ok(Arc::new(crate::backends::MemoryStore::new()))
}
