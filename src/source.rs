//! Read-through access to clubs, courts and slots
//!
//! Cache first, then the resilient upstream, then write back. Shared by the
//! request path and by detached prefetch tasks, so it is cheap to clone.

use chrono::NaiveDate;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;

use crate::cache_layer::CacheLayer;
use crate::error::Result;
use crate::models::{Club, Court, Slot, keys};
use crate::upstream::ResilientUpstream;

#[derive(Clone)]
pub struct AvailabilitySource {
    cache: Arc<CacheLayer>,
    upstream: Arc<ResilientUpstream>,
}

impl AvailabilitySource {
    pub fn new(cache: Arc<CacheLayer>, upstream: Arc<ResilientUpstream>) -> Self {
        Self { cache, upstream }
    }

    /// # Errors
    ///
    /// Any upstream error; clubs have no fallback.
    pub async fn clubs(&self, place_id: &str) -> Result<Vec<Club>> {
        self.read_through(&keys::clubs(place_id), || self.upstream.clubs(place_id))
            .await
    }

    /// # Errors
    ///
    /// Rate-limit timeout.
    pub async fn courts(&self, club_id: i64) -> Result<Vec<Court>> {
        self.read_through(&keys::courts(club_id), || self.upstream.courts(club_id))
            .await
    }

    /// # Errors
    ///
    /// Rate-limit timeout.
    pub async fn slots(&self, club_id: i64, court_id: i64, date: NaiveDate) -> Result<Vec<Slot>> {
        self.read_through(&keys::slots(club_id, court_id, date), || {
            self.upstream.slots(club_id, court_id, date)
        })
        .await
    }

    /// Whether slots for this court and day are already cached
    pub async fn is_slots_cached(&self, club_id: i64, court_id: i64, date: NaiveDate) -> bool {
        self.cache
            .get::<Vec<Slot>>(&keys::slots(club_id, court_id, date))
            .await
            .is_some()
    }

    async fn read_through<T, F, Fut>(&self, key: &str, fetch: F) -> Result<Vec<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        if let Some(cached) = self.cache.get::<Vec<T>>(key).await {
            return Ok(cached);
        }
        let fresh = fetch().await?;
        // Empty lists mean "unknown" and are skipped by the cache layer
        self.cache.set(key, &fresh, None).await;
        Ok(fresh)
    }
}
