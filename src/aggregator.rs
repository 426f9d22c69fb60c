//! Availability Aggregator
//!
//! Answers "which courts are free at this place on this day" by fanning out
//! club → courts → slots through the cache and the resilient upstream.
//!
//! # Flow
//!
//! ```text
//! clubs(place) ──► courts(club) for every club, concurrently
//!              ──► slots(club, court, date) once per unique triple, concurrently
//!              ──► reassemble in club/court order
//!              ──► (fast response) detached prefetch of the next days
//! ```
//!
//! Deduplication is scoped to one `execute` call: duplicate court entries
//! share a single fetch, but separate concurrent requests do not.

use chrono::{Days, NaiveDate};
use futures_util::future::{join_all, try_join_all};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AggregatorConfig;
use crate::error::Result;
use crate::models::{AvailabilityQuery, ClubWithAvailability, CourtWithAvailability, DATE_FORMAT, Slot};
use crate::source::AvailabilitySource;

/// Dedup key of one slot lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotTriple {
    pub club_id: i64,
    pub court_id: i64,
    pub date: NaiveDate,
}

impl fmt::Display for SlotTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.club_id,
            self.court_id,
            self.date.format(DATE_FORMAT)
        )
    }
}

/// Club/court/slot fan-out with request-scoped dedup and opportunistic prefetch
pub struct AvailabilityAggregator {
    source: AvailabilitySource,
    config: AggregatorConfig,
    clock: Arc<dyn Clock>,
}

impl AvailabilityAggregator {
    pub fn new(source: AvailabilitySource, config: AggregatorConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            source,
            config,
            clock,
        }
    }

    /// Build the availability view for a place and day
    ///
    /// A failing slot lookup leaves that court with no availability instead of
    /// failing the request.
    ///
    /// # Errors
    ///
    /// Fails when clubs can't be fetched, or when the rate limiter times out
    /// while fetching courts.
    pub async fn execute(&self, query: &AvailabilityQuery) -> Result<Vec<ClubWithAvailability>> {
        let started = Instant::now();
        info!(place_id = %query.place_id, date = %query.date, "Aggregating availability");

        let clubs = self.source.clubs(&query.place_id).await?;

        let court_lists =
            try_join_all(clubs.iter().map(|club| self.source.courts(club.id))).await?;

        // Unique triples in first-seen order
        let mut unique: HashMap<String, SlotTriple> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for (club, courts) in clubs.iter().zip(&court_lists) {
            for court in courts {
                let triple = SlotTriple {
                    club_id: club.id,
                    court_id: court.id,
                    date: query.date,
                };
                let key = triple.to_string();
                if !unique.contains_key(&key) {
                    order.push(key.clone());
                    unique.insert(key, triple);
                }
            }
        }
        debug!(unique_triples = order.len(), "Fetching slots");

        let fetched = join_all(order.iter().filter_map(|key| unique.get(key)).map(|triple| {
            let triple = *triple;
            async move {
                let slots = self
                    .source
                    .slots(triple.club_id, triple.court_id, triple.date)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(triple = %triple, error = %e, "Slot lookup failed, reporting no availability");
                        Vec::new()
                    });
                (triple.to_string(), slots)
            }
        }))
        .await;
        let slots_by_triple: HashMap<String, Vec<Slot>> = fetched.into_iter().collect();

        let result: Vec<ClubWithAvailability> = clubs
            .into_iter()
            .zip(court_lists)
            .map(|(club, courts)| {
                let courts = courts
                    .into_iter()
                    .map(|court| {
                        let key = SlotTriple {
                            club_id: club.id,
                            court_id: court.id,
                            date: query.date,
                        }
                        .to_string();
                        let available = slots_by_triple.get(&key).cloned().unwrap_or_default();
                        CourtWithAvailability { court, available }
                    })
                    .collect();
                ClubWithAvailability { club, courts }
            })
            .collect();

        let elapsed = started.elapsed();
        info!(
            place_id = %query.place_id,
            clubs = result.len(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "Availability aggregated"
        );

        if elapsed < self.config.fast_response_threshold {
            let courts: Vec<(i64, i64)> = order
                .iter()
                .filter_map(|key| unique.get(key))
                .map(|t| (t.club_id, t.court_id))
                .collect();
            // Dropping the handle detaches the task
            if let Some(handle) = self.spawn_prefetch(query.date, courts) {
                drop(handle);
            }
        }

        Ok(result)
    }

    /// Dates worth prefetching after `date`, limited to the horizon from today
    #[must_use]
    pub fn prefetch_dates(&self, date: NaiveDate) -> Vec<NaiveDate> {
        let today = self.clock.today();
        let Some(horizon) = today.checked_add_days(Days::new(u64::from(self.config.prefetch_horizon_days)))
        else {
            return Vec::new();
        };
        (1..=u64::from(self.config.prefetch_days))
            .filter_map(|offset| date.checked_add_days(Days::new(offset)))
            .filter(|candidate| *candidate >= today && *candidate <= horizon)
            .collect()
    }

    /// Warm the slot cache for the next days without blocking the caller
    ///
    /// Returns `None` when there is nothing to prefetch.
    pub fn spawn_prefetch(&self, date: NaiveDate, courts: Vec<(i64, i64)>) -> Option<JoinHandle<()>> {
        if courts.is_empty() {
            return None;
        }
        let dates = self.prefetch_dates(date);
        if dates.is_empty() {
            info!(date = %date, "No prefetch date within horizon, skipping");
            return None;
        }

        let source = self.source.clone();
        Some(tokio::spawn(async move {
            prefetch(source, dates, courts).await;
        }))
    }
}

async fn prefetch(source: AvailabilitySource, dates: Vec<NaiveDate>, courts: Vec<(i64, i64)>) {
    for date in dates {
        let warmed = join_all(courts.iter().map(|&(club_id, court_id)| {
            let source = &source;
            async move {
                if source.is_slots_cached(club_id, court_id, date).await {
                    return false;
                }
                match source.slots(club_id, court_id, date).await {
                    Ok(_) => true,
                    Err(e) => {
                        warn!(club_id, court_id, date = %date, error = %e, "Prefetch failed");
                        false
                    }
                }
            }
        }))
        .await;
        let fetched = warmed.into_iter().filter(|w| *w).count();
        debug!(date = %date, fetched, "Prefetch pass finished");
    }
}
