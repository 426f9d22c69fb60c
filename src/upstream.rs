//! Resilient access to the availability provider
//!
//! Every outbound call first waits for a rate-limit permit, then runs inside
//! the circuit breaker. A rate-limit timeout is raised before the breaker is
//! involved, so no fallback ever hides it.

use chrono::NaiveDate;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

use crate::circuit_breaker::CircuitBreaker;
use crate::error::{Error, Result};
use crate::metrics::MetricsSink;
use crate::models::{Club, Court, Slot};
use crate::rate_limiter::RateLimiter;
use crate::traits::AvailabilityUpstream;

/// Upstream provider behind a rate limiter and a circuit breaker
pub struct ResilientUpstream {
    inner: Arc<dyn AvailabilityUpstream>,
    rate_limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    metrics: Arc<dyn MetricsSink>,
    identifier: String,
}

impl ResilientUpstream {
    pub fn new(
        inner: Arc<dyn AvailabilityUpstream>,
        rate_limiter: Arc<RateLimiter>,
        breaker: Arc<CircuitBreaker>,
        metrics: Arc<dyn MetricsSink>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            inner,
            rate_limiter,
            breaker,
            metrics,
            identifier: identifier.into(),
        }
    }

    #[must_use]
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// Clubs at a place; upstream failure is returned to the caller
    ///
    /// # Errors
    ///
    /// Rate-limit timeout, open circuit, or the upstream error.
    pub async fn clubs(&self, place_id: &str) -> Result<Vec<Club>> {
        self.call("clubs", false, || self.inner.get_clubs(place_id))
            .await
    }

    /// Courts of a club; an upstream failure or open circuit yields no courts
    ///
    /// # Errors
    ///
    /// Only a rate-limit timeout.
    pub async fn courts(&self, club_id: i64) -> Result<Vec<Court>> {
        self.call("courts", true, || self.inner.get_courts(club_id))
            .await
    }

    /// Slots of one court on one day; an upstream failure or open circuit yields no slots
    ///
    /// # Errors
    ///
    /// Only a rate-limit timeout.
    pub async fn slots(&self, club_id: i64, court_id: i64, date: NaiveDate) -> Result<Vec<Slot>> {
        self.call("slots", true, || self.inner.get_slots(club_id, court_id, date))
            .await
    }

    async fn call<T, F, Fut>(&self, resource: &'static str, empty_fallback: bool, operation: F) -> Result<Vec<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        self.metrics.record_request();
        let started = Instant::now();

        if let Err(e) = self.rate_limiter.wait_for_slot(&self.identifier).await {
            self.metrics.record_error(e.kind());
            return Err(e);
        }

        let metrics = &self.metrics;
        let observed = || async {
            let result = operation().await;
            if let Err(e) = &result {
                metrics.record_error(e.kind());
            }
            result
        };

        let result = if empty_fallback {
            self.breaker
                .execute_with_fallback(observed, || async { Ok(Vec::new()) })
                .await
        } else {
            self.breaker.execute(observed).await
        };

        // Errors raised by the operation itself were counted above
        if let Err(e @ Error::CircuitOpen { .. }) = &result {
            self.metrics.record_error(e.kind());
        }

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.metrics.record_response_time(elapsed_ms);
        debug!(resource, elapsed_ms, ok = result.is_ok(), "Upstream call finished");
        result
    }
}
