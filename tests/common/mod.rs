//! Common utilities for integration tests
//!
//! This module provides shared test infrastructure including:
//! - A scripted upstream provider with call accounting
//! - A recording metrics sink
//! - Service setup over an in-memory store and a manual clock
//! - Polling helper for background work

#![allow(dead_code)]

use anyhow::{Result as AnyResult, anyhow};
use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use court_availability_cache::{
    AvailabilityService, AvailabilityServiceBuilder, AvailabilityUpstream, Club, Config, Court,
    Error, KeyValueStore, ManualClock, MemoryStore, MetricsSink, Result, Slot, models::DATE_FORMAT,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub const PLACE: &str = "paris-15";

/// Initialize tracing once; output is captured per test
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fixed "today" for every test
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
}

pub fn day(offset: u64) -> NaiveDate {
    today().checked_add_days(Days::new(offset)).unwrap()
}

pub fn slot_at(date: NaiveDate, hour: u32) -> Slot {
    Slot {
        datetime: format!("{}T{hour:02}:00:00", date.format(DATE_FORMAT)),
        price: 24.0,
        duration: 60,
        start: format!("{hour:02}:00"),
        end: format!("{:02}:00", hour + 1),
    }
}

/// Upstream provider driven by a script
#[derive(Default)]
pub struct FakeUpstream {
    clubs: Mutex<HashMap<String, Vec<Club>>>,
    courts: Mutex<HashMap<i64, Vec<Court>>>,
    failing_courts: Mutex<HashSet<(i64, i64)>>,
    fail_clubs: AtomicBool,
    fail_everything: AtomicBool,
    slot_delay: Mutex<Option<Duration>>,
    calls: Mutex<Vec<String>>,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_clubs(&self, place: &str, clubs: Vec<Club>) -> &Self {
        self.clubs.lock().insert(place.to_string(), clubs);
        self
    }

    pub fn with_courts(&self, club_id: i64, courts: Vec<Court>) -> &Self {
        self.courts.lock().insert(club_id, courts);
        self
    }

    /// Slot lookups for this court fail on every date
    pub fn fail_slots_for(&self, club_id: i64, court_id: i64) -> &Self {
        self.failing_courts.lock().insert((club_id, court_id));
        self
    }

    pub fn fail_clubs(&self, fail: bool) {
        self.fail_clubs.store(fail, Ordering::SeqCst);
    }

    pub fn fail_everything(&self, fail: bool) {
        self.fail_everything.store(fail, Ordering::SeqCst);
    }

    pub fn delay_slots(&self, delay: Duration) {
        *self.slot_delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn slot_calls(&self, club_id: i64, court_id: i64, date: NaiveDate) -> usize {
        self.count_calls(&format!("slots:{club_id}:{court_id}:{}", date.format(DATE_FORMAT)))
    }

    fn log(&self, call: String) {
        self.calls.lock().push(call);
    }

    fn outage(&self) -> Result<()> {
        if self.fail_everything.load(Ordering::SeqCst) {
            return Err(Error::upstream(anyhow!("provider returned 503")));
        }
        Ok(())
    }
}

#[async_trait]
impl AvailabilityUpstream for FakeUpstream {
    async fn get_clubs(&self, place_id: &str) -> Result<Vec<Club>> {
        self.log(format!("clubs:{place_id}"));
        self.outage()?;
        if self.fail_clubs.load(Ordering::SeqCst) {
            return Err(Error::upstream(anyhow!("clubs endpoint timed out")));
        }
        Ok(self.clubs.lock().get(place_id).cloned().unwrap_or_default())
    }

    async fn get_courts(&self, club_id: i64) -> Result<Vec<Court>> {
        self.log(format!("courts:{club_id}"));
        self.outage()?;
        Ok(self.courts.lock().get(&club_id).cloned().unwrap_or_default())
    }

    async fn get_slots(&self, club_id: i64, court_id: i64, date: NaiveDate) -> Result<Vec<Slot>> {
        self.log(format!("slots:{club_id}:{court_id}:{}", date.format(DATE_FORMAT)));
        let delay = *self.slot_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.outage()?;
        if self.failing_courts.lock().contains(&(club_id, court_id)) {
            return Err(Error::upstream(anyhow!("slots for court {court_id} unavailable")));
        }
        let hour = u32::try_from(court_id.rem_euclid(12)).unwrap() + 8;
        Ok(vec![slot_at(date, hour)])
    }
}

/// Metrics sink that keeps everything it is told
#[derive(Default)]
pub struct RecordingMetrics {
    pub requests: AtomicU64,
    pub errors: Mutex<Vec<String>>,
    pub response_times: Mutex<Vec<u64>>,
}

impl RecordingMetrics {
    pub fn error_count(&self, kind: &str) -> usize {
        self.errors.lock().iter().filter(|k| *k == kind).count()
    }
}

impl MetricsSink for RecordingMetrics {
    fn record_response_time(&self, ms: u64) {
        self.response_times.lock().push(ms);
    }

    fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }

    fn record_error(&self, kind: &str) {
        self.errors.lock().push(kind.to_string());
    }
}

/// Store whose every operation fails
pub struct UnreachableStore;

#[async_trait]
impl KeyValueStore for UnreachableStore {
    async fn get(&self, _key: &str) -> AnyResult<Option<Vec<u8>>> {
        Err(anyhow!("connection refused"))
    }

    async fn set_with_ttl(&self, _key: &str, _value: &[u8], _ttl: Duration) -> AnyResult<()> {
        Err(anyhow!("connection refused"))
    }

    async fn remove(&self, _key: &str) -> AnyResult<()> {
        Err(anyhow!("connection refused"))
    }

    async fn scan_keys(&self, _pattern: &str) -> AnyResult<Vec<String>> {
        Err(anyhow!("connection refused"))
    }

    async fn remove_bulk(&self, _keys: &[String]) -> AnyResult<usize> {
        Err(anyhow!("connection refused"))
    }

    async fn health_check(&self) -> bool {
        false
    }
}

/// Generous limits so only tests that care about throttling see it
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.rate_limit.rpm = 6000;
    config.rate_limit.max_wait_time = Duration::from_millis(200);
    config.rate_limit.check_interval = Duration::from_millis(10);
    config
}

/// Everything a test needs to poke at
pub struct TestEnv {
    pub store: MemoryStore,
    pub upstream: Arc<FakeUpstream>,
    pub metrics: Arc<RecordingMetrics>,
    pub clock: Arc<ManualClock>,
    pub service: AvailabilityService,
}

pub async fn setup() -> TestEnv {
    setup_with_config(test_config()).await
}

pub async fn setup_with_config(config: Config) -> TestEnv {
    init_tracing();
    let store = MemoryStore::new();
    let upstream = FakeUpstream::new();
    let metrics = Arc::new(RecordingMetrics::default());
    let clock = Arc::new(ManualClock::at_date(today()));

    let service = AvailabilityServiceBuilder::new()
        .with_config(config)
        .with_store(Arc::new(store.clone()))
        .with_upstream(upstream.clone())
        .with_metrics(metrics.clone())
        .with_clock(clock.clone())
        .build()
        .await
        .unwrap();

    TestEnv {
        store,
        upstream,
        metrics,
        clock,
        service,
    }
}

/// Poll `condition` until it holds, panicking after `timeout`
pub async fn wait_for<F>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> bool,
{
    let step = Duration::from_millis(5);
    let mut waited = Duration::ZERO;
    while !condition() {
        assert!(waited < timeout, "condition not met within {timeout:?}");
        tokio::time::sleep(step).await;
        waited += step;
    }
}
