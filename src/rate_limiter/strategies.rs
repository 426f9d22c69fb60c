//! Rate-limiting algorithms
//!
//! A strategy is pure: it gets the persisted state (if any) and the current
//! time, and returns the decision together with the state to write back.

use serde::{Deserialize, Serialize};

/// Persisted per-identifier state
///
/// For [`TokenBucket`], `tokens` is the token count and `last_refill` the
/// last refill time. For [`SlidingWindow`], `tokens` counts requests in the
/// current window starting at `last_refill` and `previous` holds the count of
/// the window before it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    pub tokens: f64,
    /// Epoch milliseconds
    pub last_refill: u64,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub previous: f64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &f64) -> bool {
    *v == 0.0
}

impl BucketState {
    #[must_use]
    pub fn new(tokens: f64, last_refill: u64) -> Self {
        Self {
            tokens,
            last_refill,
            previous: 0.0,
        }
    }
}

/// Outcome of one check
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decision {
    pub allowed: bool,
    pub new_state: BucketState,
}

/// Swappable rate-limiting algorithm
pub trait RateLimitStrategy: Send + Sync {
    /// Try to consume one permit
    fn can_consume(
        &self,
        state: Option<BucketState>,
        now_ms: u64,
        capacity: f64,
        refill_rate: f64,
    ) -> Decision;

    /// Permits available right now, without consuming any
    fn remaining(&self, state: Option<BucketState>, now_ms: u64, capacity: f64, refill_rate: f64) -> u32;

    fn name(&self) -> &'static str;
}

#[allow(clippy::cast_precision_loss)]
fn elapsed_secs(from_ms: u64, to_ms: u64) -> f64 {
    to_ms.saturating_sub(from_ms) as f64 / 1000.0
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_permits(value: f64) -> u32 {
    value.max(0.0).floor().min(f64::from(u32::MAX)) as u32
}

/// Continuous-refill token bucket
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenBucket;

impl TokenBucket {
    fn refill(state: Option<BucketState>, now_ms: u64, capacity: f64, refill_rate: f64) -> f64 {
        match state {
            None => capacity,
            Some(s) => (s.tokens + elapsed_secs(s.last_refill, now_ms) * refill_rate).clamp(0.0, capacity),
        }
    }
}

impl RateLimitStrategy for TokenBucket {
    fn can_consume(
        &self,
        state: Option<BucketState>,
        now_ms: u64,
        capacity: f64,
        refill_rate: f64,
    ) -> Decision {
        let tokens = Self::refill(state, now_ms, capacity, refill_rate);
        if tokens >= 1.0 {
            Decision {
                allowed: true,
                new_state: BucketState::new(tokens - 1.0, now_ms),
            }
        } else {
            Decision {
                allowed: false,
                new_state: BucketState::new(tokens, now_ms),
            }
        }
    }

    fn remaining(&self, state: Option<BucketState>, now_ms: u64, capacity: f64, refill_rate: f64) -> u32 {
        floor_permits(Self::refill(state, now_ms, capacity, refill_rate))
    }

    fn name(&self) -> &'static str {
        "token_bucket"
    }
}

/// Sliding-window counter
///
/// The window length is `capacity / refill_rate` seconds (60s for an rpm
/// limit). The previous window's count is weighted by how much of it still
/// overlaps the sliding window.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlidingWindow;

impl SlidingWindow {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn window_ms(capacity: f64, refill_rate: f64) -> u64 {
        if refill_rate <= 0.0 {
            return 60_000;
        }
        ((capacity / refill_rate) * 1000.0).max(1.0) as u64
    }

    /// Roll the window forward and return (state, estimated usage)
    #[allow(clippy::cast_precision_loss)]
    fn rolled(state: Option<BucketState>, now_ms: u64, capacity: f64, refill_rate: f64) -> (BucketState, f64) {
        let window = Self::window_ms(capacity, refill_rate);
        let mut s = state.unwrap_or_else(|| BucketState::new(0.0, now_ms));

        let since_start = now_ms.saturating_sub(s.last_refill);
        if since_start >= window {
            let windows_passed = since_start / window;
            s.previous = if windows_passed == 1 { s.tokens } else { 0.0 };
            s.tokens = 0.0;
            s.last_refill += windows_passed * window;
        }

        let into_window = now_ms.saturating_sub(s.last_refill) as f64 / window as f64;
        let estimated = s.previous * (1.0 - into_window) + s.tokens;
        (s, estimated)
    }
}

impl RateLimitStrategy for SlidingWindow {
    fn can_consume(
        &self,
        state: Option<BucketState>,
        now_ms: u64,
        capacity: f64,
        refill_rate: f64,
    ) -> Decision {
        let (mut s, estimated) = Self::rolled(state, now_ms, capacity, refill_rate);
        let allowed = estimated + 1.0 <= capacity;
        if allowed {
            s.tokens += 1.0;
        }
        Decision { allowed, new_state: s }
    }

    fn remaining(&self, state: Option<BucketState>, now_ms: u64, capacity: f64, refill_rate: f64) -> u32 {
        let (_, estimated) = Self::rolled(state, now_ms, capacity, refill_rate);
        floor_permits(capacity - estimated)
    }

    fn name(&self) -> &'static str {
        "sliding_window"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPACITY: f64 = 60.0;
    const RATE: f64 = 1.0;

    fn drain(strategy: &dyn RateLimitStrategy, now: u64) -> (u32, Option<BucketState>) {
        let mut state = None;
        let mut allowed = 0;
        loop {
            let decision = strategy.can_consume(state, now, CAPACITY, RATE);
            state = Some(decision.new_state);
            if !decision.allowed {
                return (allowed, state);
            }
            allowed += 1;
        }
    }

    #[test]
    fn test_token_bucket_capacity() {
        let (allowed, state) = drain(&TokenBucket, 1_000);
        assert_eq!(allowed, 60);
        assert_eq!(TokenBucket.remaining(state, 1_000, CAPACITY, RATE), 0);
    }

    #[test]
    fn test_token_bucket_refill_is_capped() {
        let (_, state) = drain(&TokenBucket, 0);
        assert_eq!(TokenBucket.remaining(state, 5_500, CAPACITY, RATE), 5);
        assert_eq!(TokenBucket.remaining(state, 600_000, CAPACITY, RATE), 60);

        let refilled = TokenBucket.can_consume(state, 600_000, CAPACITY, RATE);
        assert!(refilled.allowed);
        assert!((refilled.new_state.tokens - 59.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_denied_check_persists_refreshed_state() {
        let (_, state) = drain(&TokenBucket, 0);
        let decision = TokenBucket.can_consume(state, 500, CAPACITY, RATE);
        assert!(!decision.allowed);
        assert_eq!(decision.new_state.last_refill, 500);
        assert!((decision.new_state.tokens - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_sliding_window_limits_and_decays() {
        let (allowed, state) = drain(&SlidingWindow, 0);
        assert_eq!(allowed, 60);

        // Half a window later half of the previous window still counts
        assert_eq!(SlidingWindow.remaining(state, 90_000, CAPACITY, RATE), 30);
        // Two windows later nothing counts
        assert_eq!(SlidingWindow.remaining(state, 120_000, CAPACITY, RATE), 60);
    }
}
