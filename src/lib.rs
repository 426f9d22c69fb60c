//! Court Availability Cache
//!
//! Resilience and aggregation layer in front of a slow, rate-limited court
//! booking provider:
//! - **Rate Limiting**: Distributed token bucket (or sliding window) shared through Redis
//! - **Circuit Breaking**: Stop hammering a failing provider, probe again after a cool-down
//! - **Read-Through Cache**: JSON values with per-namespace TTLs and glob invalidation
//! - **Aggregation**: Club → courts → slots fan-out with request-scoped dedup
//! - **Prefetch**: Warm the next days in the background after fast responses
//! - **Invalidation**: Provider update events mapped onto cache deletions
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use court_availability_cache::{AvailabilityQuery, AvailabilityServiceBuilder};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let service = AvailabilityServiceBuilder::new()
//!         .with_upstream(Arc::new(MyProviderClient::new()))
//!         .build()
//!         .await?;
//!
//!     let date = chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
//!     let clubs = service.aggregator.execute(&AvailabilityQuery::new("paris-15", date)).await?;
//!     tracing::info!("{} clubs", clubs.len());
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Aggregator → CacheLayer ──hit──► return
//!                  │ miss
//!                  ▼
//!          RateLimiter.wait_for_slot → CircuitBreaker → provider
//!                  │
//!                  ▼
//!             write back (non-empty only)
//! ```

use std::sync::Arc;

pub mod aggregator;
pub mod backends;
pub mod builder;
pub mod cache_layer;
pub mod circuit_breaker;
pub mod clock;
pub mod codecs;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod metrics;
pub mod models;
pub mod rate_limiter;
pub mod source;
pub mod traits;
pub mod upstream;

pub use aggregator::{AvailabilityAggregator, SlotTriple};
pub use backends::MemoryStore;
#[cfg(feature = "redis")]
pub use backends::RedisStore;
pub use builder::AvailabilityServiceBuilder;
pub use cache_layer::{CacheLayer, CacheMetrics, CacheOperations};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AggregatorConfig, CacheTtlConfig, CircuitBreakerConfig, Config, RateLimitConfig,
    RateLimitStrategyKind,
};
pub use error::{Error, Result};
pub use invalidation::{DomainEvent, InvalidationHandlers, InvalidationStats};
pub use metrics::{MetricsSink, NoopMetrics};
pub use models::{
    AvailabilityQuery, Club, ClubWithAvailability, Court, CourtWithAvailability, Slot,
};
pub use rate_limiter::RateLimiter;
pub use source::AvailabilitySource;
pub use traits::{AvailabilityUpstream, CacheCodec, KeyValueStore};
pub use upstream::ResilientUpstream;

// Re-export async_trait for implementors of the upstream and store traits
pub use async_trait::async_trait;

/// Fully wired availability service
///
/// Built with [`AvailabilityServiceBuilder`]. Components are shared, so
/// clones are cheap and see the same state.
#[derive(Clone)]
pub struct AvailabilityService {
    pub cache: Arc<CacheLayer>,
    pub rate_limiter: Arc<RateLimiter>,
    pub circuit_breaker: Arc<CircuitBreaker>,
    pub aggregator: Arc<AvailabilityAggregator>,
    pub invalidation: Arc<InvalidationHandlers>,
}

impl AvailabilityService {
    /// Whether the shared store answers
    pub async fn health_check(&self) -> bool {
        self.cache.health_check().await
    }
}
