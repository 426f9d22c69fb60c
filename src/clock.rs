//! Wall-clock abstraction
//!
//! Token buckets persist epoch timestamps in the shared store, so they need a
//! real (or controllable) wall clock rather than a monotonic `Instant`.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of "now" for components that persist timestamps
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch
    fn now_millis(&self) -> u64;

    /// Current UTC calendar date
    fn today(&self) -> NaiveDate {
        let millis = i64::try_from(self.now_millis()).unwrap_or(i64::MAX);
        DateTime::<Utc>::from_timestamp_millis(millis)
            .unwrap_or_default()
            .date_naive()
    }
}

/// System wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

/// Manually advanced clock for deterministic tests
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Start at the given epoch millisecond
    #[must_use]
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    /// Start at midnight UTC of `date`
    #[must_use]
    pub fn at_date(date: NaiveDate) -> Self {
        let millis = date
            .and_hms_opt(0, 0, 0)
            .map_or(0, |dt| dt.and_utc().timestamp_millis());
        Self::new(u64::try_from(millis).unwrap_or(0))
    }

    pub fn advance(&self, by: Duration) {
        let by = u64::try_from(by.as_millis()).unwrap_or(u64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_today_follows_advance() {
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let clock = ManualClock::at_date(start);
        assert_eq!(clock.today(), start);

        clock.advance(Duration::from_secs(23 * 3600));
        assert_eq!(clock.today(), start);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(clock.today(), start.succ_opt().unwrap());
    }

    #[test]
    fn test_system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }
}
