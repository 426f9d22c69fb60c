//! Error types
//!
//! Store backends report failures through `anyhow::Result` so context chains
//! survive. Everything that crosses the resilience stack uses [`Error`].

use thiserror::Error;

/// Errors surfaced by the resilience stack and the aggregator
#[derive(Debug, Error)]
pub enum Error {
    /// The circuit breaker refused to run the operation and no fallback was given
    #[error("circuit breaker '{name}' is open")]
    CircuitOpen { name: String },

    /// `wait_for_slot` gave up before a token became available
    #[error("rate limit wait for '{identifier}' timed out after {waited_ms}ms")]
    RateLimitTimeout { identifier: String, waited_ms: u64 },

    /// Upstream provider failure (network, 5xx, decode)
    #[error("upstream request failed: {0}")]
    Upstream(#[source] anyhow::Error),

    /// An event payload could not be decoded
    #[error("invalid event: {0}")]
    InvalidEvent(String),

    /// A configuration value could not be parsed
    #[error("invalid configuration value for {key}: {value:?}")]
    Config { key: String, value: String },
}

impl Error {
    /// Wrap any error as an upstream failure
    pub fn upstream(err: impl Into<anyhow::Error>) -> Self {
        Self::Upstream(err.into())
    }

    /// Stable label handed to `MetricsSink::record_error`
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CircuitOpen { .. } => "circuit_open",
            Self::RateLimitTimeout { .. } => "rate_limit_timeout",
            Self::Upstream(_) => "upstream",
            Self::InvalidEvent(_) => "invalid_event",
            Self::Config { .. } => "config",
        }
    }

    /// True for the only error class allowed to escape the resilience stack by default
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RateLimitTimeout { .. })
    }
}

/// Crate result alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let open = Error::CircuitOpen { name: "upstream".to_string() };
        assert_eq!(open.kind(), "circuit_open");
        assert_eq!(open.to_string(), "circuit breaker 'upstream' is open");

        let timeout = Error::RateLimitTimeout {
            identifier: "http-client".to_string(),
            waited_ms: 250,
        };
        assert!(timeout.is_timeout());
        assert_eq!(timeout.kind(), "rate_limit_timeout");

        let upstream = Error::upstream(anyhow::anyhow!("503 Service Unavailable"));
        assert!(!upstream.is_timeout());
        assert!(upstream.to_string().contains("503"));
    }
}
