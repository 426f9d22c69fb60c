//! Event-driven cache invalidation
//!
//! Domain events arrive already decoded (the transport is someone else's
//! problem) and are translated into cache deletions. A cache failure never
//! makes event processing fail: every handler logs and moves on.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

use crate::cache_layer::CacheLayer;
use crate::error::{Error, Result};
use crate::models::{Slot, keys};

/// Field name whose change affects computed availability
pub const OPENING_HOURS_FIELD: &str = "openhours";

/// Update notifications from the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum DomainEvent {
    /// Club metadata changed; `fields` names what changed
    ClubUpdated { club_id: i64, fields: Vec<String> },

    /// Court metadata changed
    CourtUpdated {
        club_id: i64,
        court_id: i64,
        fields: Vec<String>,
    },

    /// A slot was taken
    SlotBooked { club_id: i64, court_id: i64, slot: Slot },

    /// A slot was released
    SlotAvailable { club_id: i64, court_id: i64, slot: Slot },
}

impl DomainEvent {
    pub fn club_updated<S: Into<String>>(club_id: i64, fields: impl IntoIterator<Item = S>) -> Self {
        Self::ClubUpdated {
            club_id,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn court_updated<S: Into<String>>(
        club_id: i64,
        court_id: i64,
        fields: impl IntoIterator<Item = S>,
    ) -> Self {
        Self::CourtUpdated {
            club_id,
            court_id,
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Decode a transport payload
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] for unknown types or missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidEvent(e.to_string()))
    }

    /// # Errors
    ///
    /// Returns [`Error::InvalidEvent`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidEvent(e.to_string()))
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ClubUpdated { .. } => "club_updated",
            Self::CourtUpdated { .. } => "court_updated",
            Self::SlotBooked { .. } => "slot_booked",
            Self::SlotAvailable { .. } => "slot_available",
        }
    }
}

/// Statistics for invalidation handling
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationStats {
    pub events_received: u64,
    pub club_updates: u64,
    pub court_updates: u64,
    pub slots_booked: u64,
    pub slots_released: u64,
    /// Single-key deletes plus keys matched by pattern invalidation
    pub keys_removed: u64,
    /// Cache operations that failed and were absorbed
    pub processing_errors: u64,
}

/// Thread-safe statistics for invalidation handling
#[derive(Debug, Default)]
struct AtomicInvalidationStats {
    events_received: AtomicU64,
    club_updates: AtomicU64,
    court_updates: AtomicU64,
    slots_booked: AtomicU64,
    slots_released: AtomicU64,
    keys_removed: AtomicU64,
    processing_errors: AtomicU64,
}

impl AtomicInvalidationStats {
    fn snapshot(&self) -> InvalidationStats {
        InvalidationStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            club_updates: self.club_updates.load(Ordering::Relaxed),
            court_updates: self.court_updates.load(Ordering::Relaxed),
            slots_booked: self.slots_booked.load(Ordering::Relaxed),
            slots_released: self.slots_released.load(Ordering::Relaxed),
            keys_removed: self.keys_removed.load(Ordering::Relaxed),
            processing_errors: self.processing_errors.load(Ordering::Relaxed),
        }
    }
}

/// Translates domain events into cache invalidations
pub struct InvalidationHandlers {
    cache: Arc<CacheLayer>,
    stats: AtomicInvalidationStats,
}

impl InvalidationHandlers {
    pub fn new(cache: Arc<CacheLayer>) -> Self {
        Self {
            cache,
            stats: AtomicInvalidationStats::default(),
        }
    }

    #[must_use]
    pub fn stats(&self) -> InvalidationStats {
        self.stats.snapshot()
    }

    /// Dispatch an event to its handler
    pub async fn handle(&self, event: &DomainEvent) {
        match event {
            DomainEvent::ClubUpdated { club_id, fields } => self.on_club_updated(*club_id, fields).await,
            DomainEvent::CourtUpdated {
                club_id,
                court_id,
                fields,
            } => self.on_court_updated(*club_id, *court_id, fields).await,
            DomainEvent::SlotBooked {
                club_id,
                court_id,
                slot,
            } => self.on_slot_booked(*club_id, *court_id, slot).await,
            DomainEvent::SlotAvailable {
                club_id,
                court_id,
                slot,
            } => self.on_slot_available(*club_id, *court_id, slot).await,
        }
    }

    /// Club lists are keyed by place, not club, so every list is dropped.
    /// Opening-hours changes also drop the club's slots.
    pub async fn on_club_updated(&self, club_id: i64, fields: &[String]) {
        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        self.stats.club_updates.fetch_add(1, Ordering::Relaxed);
        info!(club_id, fields = ?fields, "Club updated, invalidating cache");

        self.invalidate(&format!("{}*", keys::CLUBS_PREFIX)).await;
        if fields.iter().any(|f| f == OPENING_HOURS_FIELD) {
            self.invalidate(&keys::club_slots_pattern(club_id)).await;
        }
    }

    pub async fn on_court_updated(&self, club_id: i64, court_id: i64, fields: &[String]) {
        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        self.stats.court_updates.fetch_add(1, Ordering::Relaxed);
        info!(club_id, court_id, fields = ?fields, "Court updated, invalidating cache");

        self.delete(&keys::courts(club_id)).await;
        self.invalidate(&keys::court_slots_pattern(club_id, court_id))
            .await;
    }

    pub async fn on_slot_booked(&self, club_id: i64, court_id: i64, slot: &Slot) {
        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        self.stats.slots_booked.fetch_add(1, Ordering::Relaxed);
        info!(club_id, court_id, datetime = %slot.datetime, "Slot booked, invalidating cache");
        self.invalidate_slot(club_id, court_id, slot).await;
    }

    pub async fn on_slot_available(&self, club_id: i64, court_id: i64, slot: &Slot) {
        self.stats.events_received.fetch_add(1, Ordering::Relaxed);
        self.stats.slots_released.fetch_add(1, Ordering::Relaxed);
        info!(club_id, court_id, datetime = %slot.datetime, "Slot available, invalidating cache");
        self.invalidate_slot(club_id, court_id, slot).await;
    }

    /// Exact date key first, then every date of the court
    async fn invalidate_slot(&self, club_id: i64, court_id: i64, slot: &Slot) {
        match slot.date() {
            Some(date) => self.delete(&keys::slots(club_id, court_id, date)).await,
            None => {
                self.stats.processing_errors.fetch_add(1, Ordering::Relaxed);
                warn!(datetime = %slot.datetime, "Unparseable slot datetime, skipping exact-key delete");
            }
        }
        self.invalidate(&keys::court_slots_pattern(club_id, court_id))
            .await;
    }

    async fn delete(&self, key: &str) {
        match self.cache.del(key).await {
            Ok(()) => {
                self.stats.keys_removed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.processing_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cache delete failed during invalidation");
            }
        }
    }

    async fn invalidate(&self, pattern: &str) {
        match self.cache.invalidate_pattern(pattern).await {
            Ok(removed) => {
                self.stats
                    .keys_removed
                    .fetch_add(removed as u64, Ordering::Relaxed);
            }
            Err(e) => {
                self.stats.processing_errors.fetch_add(1, Ordering::Relaxed);
                warn!(pattern = %pattern, error = %e, "Pattern invalidation failed");
            }
        }
    }
}
