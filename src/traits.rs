//! Seams
//!
//! This module defines the trait abstractions the resilience stack is built on.
//!
//! # Architecture
//!
//! - `CacheCodec`: Trait for pluggable serialization of cached values and bucket state
//! - `KeyValueStore`: Shared TTL-capable store (Redis in production)
//! - `AvailabilityUpstream`: The court-availability provider being shielded
//!
//! # Example: Custom Store
//!
//! ```rust,ignore
//! use court_availability_cache::{KeyValueStore, async_trait};
//! use std::time::Duration;
//! use anyhow::Result;
//!
//! struct MyStore {
//!     // Your implementation
//! }
//!
//! #[async_trait]
//! impl KeyValueStore for MyStore {
//!     async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> { todo!() }
//!     async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> { todo!() }
//!     async fn remove(&self, key: &str) -> Result<()> { todo!() }
//!     async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> { todo!() }
//!     async fn remove_bulk(&self, keys: &[String]) -> Result<usize> { todo!() }
//!     async fn health_check(&self) -> bool { todo!() }
//! }
//! ```

use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::time::Duration;

use crate::models::{Club, Court, Slot};

/// Trait for cache value serialization/deserialization
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync + Debug` to support concurrent access across async tasks
/// and provide debugging capabilities.
pub trait CacheCodec: Send + Sync + Debug {
    /// Serialize a value to bytes
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be represented by this codec.
    fn serialize<T: Serialize + ?Sized>(&self, value: &T) -> Result<Vec<u8>>;

    /// Deserialize bytes to a value
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are malformed or don't match `T`.
    fn deserialize<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T>;

    /// Get the name of the codec, used for logging
    fn name(&self) -> &'static str;
}

/// Shared, TTL-capable key-value store
///
/// Every component that needs cross-process state (cache entries, token
/// buckets) goes through this trait. Access is always read-then-write of
/// independent keys; there are no multi-key transactions.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync` to support concurrent access across async tasks.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get raw bytes by key
    ///
    /// # Returns
    ///
    /// * `Ok(Some(bytes))` - Key present
    /// * `Ok(None)` - Key not found or expired
    /// * `Err(e)` - Store unreachable
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes with a time-to-live
    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    /// Remove a key (no error if it didn't exist)
    async fn remove(&self, key: &str) -> Result<()>;

    /// List keys matching a glob-style pattern (`*`, `?`, `[...]`)
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Remove many keys at once, returning how many existed
    async fn remove_bulk(&self, keys: &[String]) -> Result<usize>;

    /// Check if the store is reachable and round-trips a value
    async fn health_check(&self) -> bool;

    /// Get the name of this store, used for logging
    fn name(&self) -> &'static str {
        "unknown"
    }
}

/// The court-availability provider
///
/// Transport details (HTTP, auth, retries at the socket level) belong to the
/// implementor. Failures should be reported as [`crate::Error::Upstream`].
#[async_trait]
pub trait AvailabilityUpstream: Send + Sync {
    /// Clubs located at a place
    async fn get_clubs(&self, place_id: &str) -> crate::Result<Vec<Club>>;

    /// Courts belonging to a club
    async fn get_courts(&self, club_id: i64) -> crate::Result<Vec<Court>>;

    /// Free slots on one court for one calendar day
    async fn get_slots(&self, club_id: i64, court_id: i64, date: NaiveDate) -> crate::Result<Vec<Slot>>;
}
