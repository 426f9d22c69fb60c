//! Cache Layer - Typed Read-Through Cache
//!
//! Wraps the shared [`KeyValueStore`] with JSON (de)serialization, per-namespace
//! default TTLs, glob invalidation and hit/miss accounting.
//!
//! `get` and `set` never fail: an unreachable store or a malformed payload is
//! a miss, and a failed write is logged and dropped. Deletes and pattern
//! invalidation do report store errors so callers can decide what to do.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use crate::codecs::JsonCodec;
use crate::config::CacheTtlConfig;
use crate::models::keys::{CLUBS_PREFIX, COURTS_PREFIX};
use crate::traits::{CacheCodec, KeyValueStore};

/// Resource namespaces with their own default TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Clubs,
    Courts,
    Slots,
}

impl ResourceKind {
    /// Resolve a key's namespace; unknown prefixes are treated as slots
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        if key.starts_with(CLUBS_PREFIX) {
            Self::Clubs
        } else if key.starts_with(COURTS_PREFIX) {
            Self::Courts
        } else {
            Self::Slots
        }
    }

    #[must_use]
    pub fn default_ttl(self, ttls: &CacheTtlConfig) -> Duration {
        match self {
            Self::Clubs => ttls.clubs,
            Self::Courts => ttls.courts,
            Self::Slots => ttls.slots,
        }
    }
}

/// Operation counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheOperations {
    pub gets: u64,
    pub sets: u64,
    pub deletes: u64,
    pub invalidations: u64,
}

/// Snapshot returned by [`CacheLayer::get_metrics`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub total: u64,
    /// `hits / total`, 0 when nothing was read yet
    pub hit_ratio: f64,
    pub operations: CacheOperations,
}

#[derive(Debug, Default)]
struct AtomicCacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    gets: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    invalidations: AtomicU64,
}

impl AtomicCacheMetrics {
    #[allow(clippy::cast_precision_loss)]
    fn snapshot(&self) -> CacheMetrics {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CacheMetrics {
            hits,
            misses,
            total,
            hit_ratio: if total > 0 { hits as f64 / total as f64 } else { 0.0 },
            operations: CacheOperations {
                gets: self.gets.load(Ordering::Relaxed),
                sets: self.sets.load(Ordering::Relaxed),
                deletes: self.deletes.load(Ordering::Relaxed),
                invalidations: self.invalidations.load(Ordering::Relaxed),
            },
        }
    }

    fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.gets,
            &self.sets,
            &self.deletes,
            &self.invalidations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Whether a value carries no information worth caching
fn is_empty_value(value: &serde_json::Value) -> bool {
    use serde_json::Value;
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Number(_) => false,
    }
}

/// Typed cache over a shared store
pub struct CacheLayer {
    store: Arc<dyn KeyValueStore>,
    codec: JsonCodec,
    ttls: CacheTtlConfig,
    metrics: AtomicCacheMetrics,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn KeyValueStore>, ttls: CacheTtlConfig) -> Self {
        debug!(store = store.name(), codec = JsonCodec.name(), "Initializing cache layer");
        Self {
            store,
            codec: JsonCodec,
            ttls,
            metrics: AtomicCacheMetrics::default(),
        }
    }

    /// Default TTL for a key, resolved from its prefix
    #[must_use]
    pub fn ttl_for_key(&self, key: &str) -> Duration {
        ResourceKind::from_key(key).default_ttl(&self.ttls)
    }

    /// Read and decode a value; `None` on miss, store error or malformed payload
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.metrics.gets.fetch_add(1, Ordering::Relaxed);

        let value = match self.store.get(key).await {
            Ok(Some(bytes)) => match self.codec.deserialize::<T>(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(key = %key, error = %e, "Malformed cache payload, treating as miss");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache store unavailable, treating as miss");
                None
            }
        };

        if value.is_some() {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "[Cache HIT]");
        } else {
            self.metrics.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "[Cache MISS]");
        }
        value
    }

    /// Encode and store a value; empty values are never cached
    ///
    /// `ttl` overrides the namespace default for this call only.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        self.metrics.sets.fetch_add(1, Ordering::Relaxed);

        let json = match serde_json::to_value(value) {
            Ok(json) if is_empty_value(&json) => {
                debug!(key = %key, "Skipping cache write of empty value");
                return;
            }
            Ok(json) => json,
            Err(e) => {
                warn!(key = %key, error = %e, "Value not serializable, skipping cache write");
                return;
            }
        };

        let ttl = ttl.unwrap_or_else(|| self.ttl_for_key(key));
        let written = match self.codec.serialize(&json) {
            Ok(bytes) => self.store.set_with_ttl(key, &bytes, ttl).await,
            Err(e) => Err(e),
        };
        match written {
            Ok(()) => debug!(key = %key, ttl_secs = ttl.as_secs(), "Cached value"),
            Err(e) => warn!(key = %key, error = %e, "Cache write failed, dropping"),
        }
    }

    /// Delete one key
    ///
    /// # Errors
    ///
    /// Returns the store error if the delete failed.
    pub async fn del(&self, key: &str) -> Result<()> {
        self.metrics.deletes.fetch_add(1, Ordering::Relaxed);
        self.store
            .remove(key)
            .await
            .with_context(|| format!("Failed to delete cache key '{key}'"))?;
        debug!(key = %key, "Deleted cache key");
        Ok(())
    }

    /// Delete every key matching a glob pattern, returning how many were removed
    ///
    /// Zero matches is not an error.
    ///
    /// # Errors
    ///
    /// Returns the store error if the scan or the bulk delete failed.
    pub async fn invalidate_pattern(&self, pattern: &str) -> Result<usize> {
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);

        let keys = self
            .store
            .scan_keys(pattern)
            .await
            .with_context(|| format!("Failed to scan keys for pattern '{pattern}'"))?;
        if keys.is_empty() {
            debug!(pattern = %pattern, "No keys matched invalidation pattern");
            return Ok(0);
        }

        let removed = self
            .store
            .remove_bulk(&keys)
            .await
            .with_context(|| format!("Failed to delete keys for pattern '{pattern}'"))?;
        debug!(pattern = %pattern, removed, "Invalidated keys by pattern");
        Ok(removed)
    }

    #[must_use]
    pub fn get_metrics(&self) -> CacheMetrics {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    pub async fn health_check(&self) -> bool {
        self.store.health_check().await
    }
}
