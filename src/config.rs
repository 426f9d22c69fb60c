//! Configuration
//!
//! All settings come from env-style keys and every key has a default. Values
//! that fail to parse are logged and replaced by the default, so loading
//! configuration never fails.

use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::error::Error;

/// Which algorithm the rate limiter applies to persisted bucket state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitStrategyKind {
    #[default]
    TokenBucket,
    SlidingWindow,
}

impl RateLimitStrategyKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TokenBucket => "token_bucket",
            Self::SlidingWindow => "sliding_window",
        }
    }
}

impl FromStr for RateLimitStrategyKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "token_bucket" => Ok(Self::TokenBucket),
            "sliding_window" => Ok(Self::SlidingWindow),
            other => Err(Error::Config {
                key: "RATE_LIMIT_STRATEGY".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Rate limiter settings
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Requests per minute; also the bucket capacity
    pub rpm: u32,
    /// TTL of persisted bucket state, slightly longer than the refill window
    pub bucket_ttl: Duration,
    /// How long `wait_for_slot` keeps polling before timing out
    pub max_wait_time: Duration,
    /// Poll interval of `wait_for_slot`
    pub check_interval: Duration,
    pub strategy: RateLimitStrategyKind,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rpm: 60,
            bucket_ttl: Duration::from_secs(120),
            max_wait_time: Duration::from_millis(60_000),
            check_interval: Duration::from_millis(100),
            strategy: RateLimitStrategyKind::TokenBucket,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    /// Informational only; reported in logs
    pub monitoring_period: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_millis(60_000),
            monitoring_period: Duration::from_secs(10),
        }
    }
}

/// Default TTL per cache namespace
#[derive(Debug, Clone, PartialEq)]
pub struct CacheTtlConfig {
    pub clubs: Duration,
    pub courts: Duration,
    pub slots: Duration,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            clubs: Duration::from_secs(86_400),
            courts: Duration::from_secs(43_200),
            slots: Duration::from_secs(3_600),
        }
    }
}

/// Aggregator settings
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatorConfig {
    /// Requests answered faster than this trigger background prefetch
    pub fast_response_threshold: Duration,
    /// How many days after the queried date to prefetch
    pub prefetch_days: u32,
    /// Prefetch never goes further than this many days from today
    pub prefetch_horizon_days: u32,
    /// Identifier of the shared upstream token bucket
    pub rate_limit_identifier: String,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fast_response_threshold: Duration::from_millis(500),
            prefetch_days: 2,
            prefetch_horizon_days: 7,
            rate_limit_identifier: "http-client".to_string(),
        }
    }
}

/// Full service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub redis_url: String,
    pub rate_limit: RateLimitConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub cache_ttl: CacheTtlConfig,
    pub aggregator: AggregatorConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            rate_limit: RateLimitConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            cache_ttl: CacheTtlConfig::default(),
            aggregator: AggregatorConfig::default(),
        }
    }
}

impl Config {
    /// Load from the process environment
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let read = Reader { lookup: &lookup };

        Self {
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            rate_limit: RateLimitConfig {
                rpm: read.parse("RATE_LIMIT_RPM", defaults.rate_limit.rpm),
                bucket_ttl: read.secs("RATE_LIMIT_BUCKET_TTL_SECONDS", defaults.rate_limit.bucket_ttl),
                max_wait_time: read.millis("RATE_LIMIT_MAX_WAIT_TIME_MS", defaults.rate_limit.max_wait_time),
                check_interval: read.millis("RATE_LIMIT_CHECK_INTERVAL_MS", defaults.rate_limit.check_interval),
                strategy: read.parse("RATE_LIMIT_STRATEGY", defaults.rate_limit.strategy),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: read.parse(
                    "CIRCUIT_BREAKER_FAILURE_THRESHOLD",
                    defaults.circuit_breaker.failure_threshold,
                ),
                recovery_timeout: read.millis(
                    "CIRCUIT_BREAKER_RECOVERY_TIMEOUT",
                    defaults.circuit_breaker.recovery_timeout,
                ),
                monitoring_period: read.millis(
                    "CIRCUIT_BREAKER_MONITORING_PERIOD",
                    defaults.circuit_breaker.monitoring_period,
                ),
            },
            cache_ttl: CacheTtlConfig {
                clubs: read.secs("CACHE_TTL_CLUBS", defaults.cache_ttl.clubs),
                courts: read.secs("CACHE_TTL_COURTS", defaults.cache_ttl.courts),
                slots: read.secs("CACHE_TTL_SLOTS", defaults.cache_ttl.slots),
            },
            aggregator: AggregatorConfig {
                fast_response_threshold: read.millis(
                    "AGGREGATOR_FAST_RESPONSE_MS",
                    defaults.aggregator.fast_response_threshold,
                ),
                prefetch_days: read.parse("AGGREGATOR_PREFETCH_DAYS", defaults.aggregator.prefetch_days),
                prefetch_horizon_days: read.parse(
                    "AGGREGATOR_PREFETCH_HORIZON_DAYS",
                    defaults.aggregator.prefetch_horizon_days,
                ),
                rate_limit_identifier: lookup("UPSTREAM_RATE_LIMIT_IDENTIFIER")
                    .unwrap_or(defaults.aggregator.rate_limit_identifier),
            },
        }
    }
}

struct Reader<'a, F> {
    lookup: &'a F,
}

impl<F> Reader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn parse<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr,
    {
        match (self.lookup)(key) {
            None => default,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(key = %key, value = %raw, "Invalid configuration value, using default");
                default
            }),
        }
    }

    fn secs(&self, key: &str, default: Duration) -> Duration {
        Duration::from_secs(self.parse(key, default.as_secs()))
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(self.parse(key, default_ms))
    }
}
