//! Circuit Breaker
//!
//! Guards calls to one upstream dependency. Each breaker owns its own state;
//! construct one per dependency and share it with `Arc`.
//!
//! ```text
//! CLOSED ──(failures >= threshold)──► OPEN
//!    ▲                                  │
//!    │                                  │ (recovery_timeout elapsed, checked lazily)
//!    │                                  ▼
//!    └────────(trial succeeds)──── HALF_OPEN ──(trial fails)──► OPEN
//! ```

use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CircuitBreakerConfig;
use crate::error::{Error, Result};

/// Breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Snapshot of a breaker's counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CircuitBreakerMetrics {
    pub failures: u32,
    pub successes: u32,
    pub last_failure_time: Option<Instant>,
    pub state: CircuitState,
}

impl CircuitBreakerMetrics {
    fn new() -> Self {
        Self {
            failures: 0,
            successes: 0,
            last_failure_time: None,
            state: CircuitState::Closed,
        }
    }
}

/// Three-state circuit breaker
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    metrics: Mutex<CircuitBreakerMetrics>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        let name = name.into();
        info!(
            breaker = %name,
            failure_threshold = config.failure_threshold,
            recovery_timeout = ?config.recovery_timeout,
            monitoring_period = ?config.monitoring_period,
            "Initializing circuit breaker"
        );
        Self {
            name,
            config,
            metrics: Mutex::new(CircuitBreakerMetrics::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, moving OPEN to HALF_OPEN once the recovery timeout has passed
    pub fn state(&self) -> CircuitState {
        let mut metrics = self.metrics.lock();
        self.refresh_state(&mut metrics);
        metrics.state
    }

    /// Current counters (state refreshed the same way as [`CircuitBreaker::state`])
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        let mut metrics = self.metrics.lock();
        self.refresh_state(&mut metrics);
        metrics.clone()
    }

    /// Run `operation` unless the circuit is open
    ///
    /// # Errors
    ///
    /// Returns [`Error::CircuitOpen`] while open, otherwise the operation's own error.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if self.state() == CircuitState::Open {
            debug!(breaker = %self.name, "Circuit open, rejecting call");
            return Err(Error::CircuitOpen {
                name: self.name.clone(),
            });
        }

        let result = operation().await;
        self.record(result.is_ok());
        result
    }

    /// Run `operation`, answering from `fallback` when the circuit is open or the operation fails
    ///
    /// # Errors
    ///
    /// Only the fallback's own error can surface.
    pub async fn execute_with_fallback<T, F, Fut, G, GFut>(&self, operation: F, fallback: G) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T>>,
    {
        if self.state() == CircuitState::Open {
            debug!(breaker = %self.name, "Circuit open, using fallback");
            return fallback().await;
        }

        match operation().await {
            Ok(value) => {
                self.record(true);
                Ok(value)
            }
            Err(e) => {
                self.record(false);
                warn!(breaker = %self.name, error = %e, "Guarded call failed, using fallback");
                fallback().await
            }
        }
    }

    /// Force the breaker back to CLOSED with zeroed counters
    pub fn reset(&self) {
        let mut metrics = self.metrics.lock();
        *metrics = CircuitBreakerMetrics::new();
        info!(breaker = %self.name, "Circuit breaker reset to CLOSED");
    }

    fn refresh_state(&self, metrics: &mut CircuitBreakerMetrics) {
        if metrics.state != CircuitState::Open {
            return;
        }
        let recovered = metrics
            .last_failure_time
            .is_none_or(|at| at.elapsed() >= self.config.recovery_timeout);
        if recovered {
            metrics.state = CircuitState::HalfOpen;
            info!(breaker = %self.name, "Circuit HALF_OPEN, next call is a trial");
        }
    }

    fn record(&self, success: bool) {
        let mut metrics = self.metrics.lock();
        match (metrics.state, success) {
            (CircuitState::HalfOpen, true) => {
                metrics.failures = 0;
                metrics.successes = 0;
                metrics.state = CircuitState::Closed;
                info!(breaker = %self.name, "Trial call succeeded, circuit CLOSED");
            }
            (CircuitState::HalfOpen, false) => {
                metrics.failures = metrics.failures.saturating_add(1);
                metrics.last_failure_time = Some(Instant::now());
                metrics.state = CircuitState::Open;
                warn!(breaker = %self.name, "Trial call failed, circuit OPEN again");
            }
            (_, true) => {
                metrics.successes = metrics.successes.saturating_add(1);
            }
            (_, false) => {
                metrics.failures = metrics.failures.saturating_add(1);
                metrics.last_failure_time = Some(Instant::now());
                if metrics.state == CircuitState::Closed
                    && metrics.failures >= self.config.failure_threshold
                {
                    metrics.state = CircuitState::Open;
                    warn!(
                        breaker = %self.name,
                        failures = metrics.failures,
                        "Failure threshold reached, circuit OPEN"
                    );
                }
            }
        }
    }
}
