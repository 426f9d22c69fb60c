//! Distributed Rate Limiter
//!
//! Per-identifier buckets live in the shared [`KeyValueStore`] under
//! `rate_limit:{identifier}`, written with a TTL a little longer than the
//! refill window so idle buckets expire on their own.
//!
//! # Consistency
//!
//! Each check is a plain read-modify-write with no cross-process lock. Two
//! concurrent checks for the same identifier can both read the same state and
//! the last write wins, so a burst may admit slightly more than `capacity`.
//! That over-admission is accepted; a distributed lock would cost a round trip
//! on every outbound call.
//!
//! # Failure behaviour
//!
//! When the store is unreachable the limiter fails open: the request is
//! allowed and the error is logged.

pub mod strategies;

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::codecs::JsonCodec;
use crate::config::{RateLimitConfig, RateLimitStrategyKind};
use crate::error::{Error, Result};
use crate::models::keys;
use crate::traits::{CacheCodec, KeyValueStore};

pub use strategies::{BucketState, Decision, RateLimitStrategy, SlidingWindow, TokenBucket};

/// Identifier used when the caller passes an empty one
pub const DEFAULT_IDENTIFIER: &str = "default";

/// Store-backed rate limiter
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    codec: JsonCodec,
    config: RateLimitConfig,
    strategy: Box<dyn RateLimitStrategy>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter using the strategy named in `config`
    pub fn new(store: Arc<dyn KeyValueStore>, config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        let strategy: Box<dyn RateLimitStrategy> = match config.strategy {
            RateLimitStrategyKind::TokenBucket => Box::new(TokenBucket),
            RateLimitStrategyKind::SlidingWindow => Box::new(SlidingWindow),
        };
        Self::with_strategy(store, config, clock, strategy)
    }

    /// Create a limiter with a custom strategy
    pub fn with_strategy(
        store: Arc<dyn KeyValueStore>,
        config: RateLimitConfig,
        clock: Arc<dyn Clock>,
        strategy: Box<dyn RateLimitStrategy>,
    ) -> Self {
        info!(
            rpm = config.rpm,
            strategy = strategy.name(),
            store = store.name(),
            "Initializing rate limiter"
        );
        Self {
            store,
            codec: JsonCodec,
            config,
            strategy,
            clock,
        }
    }

    fn capacity(&self) -> f64 {
        f64::from(self.config.rpm)
    }

    fn refill_rate(&self) -> f64 {
        f64::from(self.config.rpm) / 60.0
    }

    fn key(identifier: &str) -> String {
        if identifier.is_empty() {
            keys::rate_limit(DEFAULT_IDENTIFIER)
        } else {
            keys::rate_limit(identifier)
        }
    }

    /// Read persisted state; `Err` only when the store itself failed
    async fn load(&self, key: &str) -> anyhow::Result<Option<BucketState>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        match self.codec.deserialize::<BucketState>(&bytes) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                warn!(key = %key, error = %e, "Discarding malformed bucket state");
                Ok(None)
            }
        }
    }

    /// Consume one permit if available
    pub async fn can_make_request(&self, identifier: &str) -> bool {
        let key = Self::key(identifier);

        let state = match self.load(&key).await {
            Ok(state) => state,
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limit store unavailable, allowing request");
                return true;
            }
        };

        let now = self.clock.now_millis();
        let decision = self
            .strategy
            .can_consume(state, now, self.capacity(), self.refill_rate());

        let persisted = match self.codec.serialize(&decision.new_state) {
            Ok(bytes) => self.store.set_with_ttl(&key, &bytes, self.config.bucket_ttl).await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            warn!(key = %key, error = %e, "Failed to persist bucket state, allowing request");
            return true;
        }

        debug!(
            key = %key,
            allowed = decision.allowed,
            tokens = decision.new_state.tokens,
            "Rate limit check"
        );
        decision.allowed
    }

    /// Poll until a permit is granted or `max_wait_time` elapses
    ///
    /// # Errors
    ///
    /// Returns [`Error::RateLimitTimeout`] when no permit became available in time.
    pub async fn wait_for_slot(&self, identifier: &str) -> Result<()> {
        let started = Instant::now();
        loop {
            if self.can_make_request(identifier).await {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= self.config.max_wait_time {
                let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                warn!(identifier = %identifier, waited_ms, "Gave up waiting for a rate limit slot");
                return Err(Error::RateLimitTimeout {
                    identifier: identifier.to_string(),
                    waited_ms,
                });
            }

            let left = self.config.max_wait_time.saturating_sub(waited);
            tokio::time::sleep(self.config.check_interval.min(left)).await;
        }
    }

    /// Permits available right now (capacity when the store is unreachable)
    pub async fn get_remaining_requests(&self, identifier: &str) -> u32 {
        let key = Self::key(identifier);
        match self.load(&key).await {
            Ok(state) => self.strategy.remaining(
                state,
                self.clock.now_millis(),
                self.capacity(),
                self.refill_rate(),
            ),
            Err(e) => {
                warn!(key = %key, error = %e, "Rate limit store unavailable, reporting full capacity");
                self.config.rpm
            }
        }
    }

    #[must_use]
    pub fn get_configuration(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Drop the persisted bucket for `identifier`
    ///
    /// # Errors
    ///
    /// Returns the store error if the delete failed.
    pub async fn reset(&self, identifier: &str) -> anyhow::Result<()> {
        self.store.remove(&Self::key(identifier)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryStore;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use std::time::Duration;

    struct UnreachableStore;

    #[async_trait]
    impl KeyValueStore for UnreachableStore {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<Vec<u8>>> {
            anyhow::bail!("connection refused")
        }
        async fn set_with_ttl(&self, _key: &str, _value: &[u8], _ttl: Duration) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn remove(&self, _key: &str) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn scan_keys(&self, _pattern: &str) -> anyhow::Result<Vec<String>> {
            anyhow::bail!("connection refused")
        }
        async fn remove_bulk(&self, _keys: &[String]) -> anyhow::Result<usize> {
            anyhow::bail!("connection refused")
        }
        async fn health_check(&self) -> bool {
            false
        }
    }

    fn config(rpm: u32) -> RateLimitConfig {
        RateLimitConfig {
            rpm,
            max_wait_time: Duration::from_secs(2),
            check_interval: Duration::from_millis(100),
            ..RateLimitConfig::default()
        }
    }

    fn limiter(rpm: u32) -> (RateLimiter, MemoryStore, Arc<ManualClock>) {
        let store = MemoryStore::new();
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let limiter = RateLimiter::new(Arc::new(store.clone()), config(rpm), clock.clone());
        (limiter, store, clock)
    }

    #[tokio::test]
    async fn test_capacity_then_denied() {
        let (limiter, _, _) = limiter(10);
        for i in 0..10 {
            assert!(limiter.can_make_request("api").await, "request {i} should pass");
        }
        assert!(!limiter.can_make_request("api").await);
        // Other identifiers have their own bucket
        assert!(limiter.can_make_request("other").await);
    }

    #[tokio::test]
    async fn test_refill_over_time() {
        let (limiter, _, clock) = limiter(60);
        for _ in 0..60 {
            assert!(limiter.can_make_request("api").await);
        }
        assert_eq!(limiter.get_remaining_requests("api").await, 0);

        clock.advance(Duration::from_secs(7));
        assert_eq!(limiter.get_remaining_requests("api").await, 7);
        assert!(limiter.can_make_request("api").await);
        assert_eq!(limiter.get_remaining_requests("api").await, 6);

        clock.advance(Duration::from_secs(3_600));
        assert_eq!(limiter.get_remaining_requests("api").await, 60);
    }

    #[tokio::test]
    async fn test_bucket_persisted_with_ttl() {
        let (limiter, store, _) = limiter(60);
        assert!(limiter.can_make_request("").await);
        assert_eq!(store.ttl_of("rate_limit:default"), Some(Duration::from_secs(120)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_slot_times_out() {
        let (limiter, _, _) = limiter(1);
        limiter.wait_for_slot("api").await.unwrap();

        let err = limiter.wait_for_slot("api").await.unwrap_err();
        assert!(matches!(err, Error::RateLimitTimeout { ref identifier, .. } if identifier == "api"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_slot_succeeds_after_refill() {
        let (limiter, _, clock) = limiter(60);
        for _ in 0..60 {
            assert!(limiter.can_make_request("api").await);
        }

        let waiter = limiter.wait_for_slot("api");
        let refill = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            clock.advance(Duration::from_secs(1));
        };
        let (result, ()) = tokio::join!(waiter, refill);
        result.unwrap();
    }

    #[tokio::test]
    async fn test_fails_open_when_store_unreachable() {
        let limiter = RateLimiter::new(
            Arc::new(UnreachableStore),
            config(1),
            Arc::new(ManualClock::new(0)),
        );
        for _ in 0..5 {
            assert!(limiter.can_make_request("api").await);
        }
        assert_eq!(limiter.get_remaining_requests("api").await, 1);
        limiter.wait_for_slot("api").await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_state_resets_bucket() {
        let (limiter, store, _) = limiter(5);
        store
            .set_with_ttl("rate_limit:api", b"not json", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(limiter.get_remaining_requests("api").await, 5);
        assert!(limiter.can_make_request("api").await);
    }

    #[tokio::test]
    async fn test_sliding_window_strategy_selected_by_config() {
        let store = MemoryStore::new();
        let limiter = RateLimiter::new(
            Arc::new(store),
            RateLimitConfig {
                strategy: RateLimitStrategyKind::SlidingWindow,
                ..config(3)
            },
            Arc::new(ManualClock::new(0)),
        );
        for _ in 0..3 {
            assert!(limiter.can_make_request("api").await);
        }
        assert!(!limiter.can_make_request("api").await);
        assert_eq!(limiter.get_configuration().strategy.as_str(), "sliding_window");
    }
}
