//! Admission algorithms.
//!
//! Each strategy is a pure function of `(state, policy, now)`: it mutates the
//! key's state in place and returns the verdict. Storage, locking and time
//! sources live elsewhere.

use crate::rate_limit::{RateLimitPolicy, RateLimitResult, RateLimitState};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

/// Decision math for one algorithm.
pub trait Strategy: Send + Sync + fmt::Debug {
    /// Which algorithm this is.
    fn kind(&self) -> StrategyKind;

    /// State for a key seen for the first time at `now`.
    fn initial_state(&self, policy: &RateLimitPolicy, now: u64) -> RateLimitState;

    /// Evaluate one request. A state of another strategy's shape is replaced by
    /// this strategy's initial state before evaluating.
    fn evaluate(
        &self,
        state: &mut RateLimitState,
        policy: &RateLimitPolicy,
        now: u64,
    ) -> RateLimitResult;
}

/// Selector for the built-in strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    FixedWindow,
    SlidingWindow,
    TokenBucket,
}

impl StrategyKind {
    /// The engine implementing this kind.
    pub fn strategy(self) -> Arc<dyn Strategy> {
        match self {
            StrategyKind::FixedWindow => Arc::new(FixedWindowStrategy),
            StrategyKind::SlidingWindow => Arc::new(SlidingWindowStrategy),
            StrategyKind::TokenBucket => Arc::new(TokenBucketStrategy),
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::FixedWindow => "fixed_window",
            StrategyKind::SlidingWindow => "sliding_window",
            StrategyKind::TokenBucket => "token_bucket",
        };
        f.write_str(name)
    }
}

#[inline]
fn ceil_secs(millis: u64) -> u64 {
    millis.div_ceil(1_000)
}

/// Counts requests in non-overlapping windows.
///
/// A window opens on the first request after the previous one expired; windows
/// are not aligned to wall-clock boundaries. Up to `2 * max_requests` may pass
/// in a short span straddling a reset.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedWindowStrategy;

impl Strategy for FixedWindowStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::FixedWindow
    }

    fn initial_state(&self, policy: &RateLimitPolicy, now: u64) -> RateLimitState {
        RateLimitState::FixedWindow {
            count: 0,
            window_reset_at: now.saturating_add(policy.window_ms()),
        }
    }

    fn evaluate(
        &self,
        state: &mut RateLimitState,
        policy: &RateLimitPolicy,
        now: u64,
    ) -> RateLimitResult {
        let max = policy.max_requests();
        let (mut count, mut window_reset_at) = match *state {
            RateLimitState::FixedWindow { count, window_reset_at } => (count, window_reset_at),
            _ => (0, now.saturating_add(policy.window_ms())),
        };

        if now >= window_reset_at {
            count = 0;
            window_reset_at = now.saturating_add(policy.window_ms());
        }

        let result = if count >= max {
            RateLimitResult::denied(max, window_reset_at, ceil_secs(window_reset_at - now))
        } else {
            count += 1;
            RateLimitResult::admitted(max, max - count, window_reset_at)
        };

        *state = RateLimitState::FixedWindow { count, window_reset_at };
        result
    }
}

/// Counts requests in the trailing window ending at `now`.
///
/// Keeps one timestamp per admitted request; a request made at `t` stops
/// counting at `t + window`. Denied attempts are not recorded.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlidingWindowStrategy;

impl Strategy for SlidingWindowStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::SlidingWindow
    }

    fn initial_state(&self, _policy: &RateLimitPolicy, _now: u64) -> RateLimitState {
        RateLimitState::SlidingWindow { request_timestamps: VecDeque::new() }
    }

    fn evaluate(
        &self,
        state: &mut RateLimitState,
        policy: &RateLimitPolicy,
        now: u64,
    ) -> RateLimitResult {
        let max = policy.max_requests();
        let window_ms = policy.window_ms();
        let mut timestamps = match state {
            RateLimitState::SlidingWindow { request_timestamps } => {
                std::mem::take(request_timestamps)
            }
            _ => VecDeque::new(),
        };

        while let Some(&oldest) = timestamps.front() {
            if oldest.saturating_add(window_ms) <= now {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let result = if timestamps.len() >= max as usize {
            let frees_at = timestamps.front().map_or(now, |oldest| oldest.saturating_add(window_ms));
            RateLimitResult::denied(max, frees_at, ceil_secs(frees_at.saturating_sub(now)))
        } else {
            timestamps.push_back(now);
            // len <= max here, so the cast and subtraction cannot wrap.
            let remaining = max - timestamps.len() as u32;
            let reset_at = timestamps
                .front()
                .map_or(now, |oldest| oldest.saturating_add(window_ms));
            RateLimitResult::admitted(max, remaining, reset_at)
        };

        *state = RateLimitState::SlidingWindow { request_timestamps: timestamps };
        result
    }
}

/// Capacity-bounded pool of permits refilled continuously.
///
/// Allows bursts up to `burst_capacity` above the steady `refill_rate_per_second`.
/// The advertised limit is the burst capacity.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenBucketStrategy;

// Refill sums drift by a few ulps; values this close to a whole token or
// second are treated as exact.
const TOKEN_EPSILON: f64 = 1e-9;

impl TokenBucketStrategy {
    fn snap(tokens: f64) -> f64 {
        let whole = tokens.round();
        if (tokens - whole).abs() < TOKEN_EPSILON {
            whole
        } else {
            tokens
        }
    }

    fn millis_until_full(tokens: f64, capacity: f64, rate: f64) -> u64 {
        let missing = (capacity - tokens).max(0.0);
        (missing / rate * 1_000.0 - TOKEN_EPSILON).ceil().max(0.0) as u64
    }
}

impl Strategy for TokenBucketStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TokenBucket
    }

    fn initial_state(&self, policy: &RateLimitPolicy, now: u64) -> RateLimitState {
        RateLimitState::TokenBucket {
            tokens: f64::from(policy.burst_capacity()),
            last_refill_at: now,
        }
    }

    fn evaluate(
        &self,
        state: &mut RateLimitState,
        policy: &RateLimitPolicy,
        now: u64,
    ) -> RateLimitResult {
        let burst = policy.burst_capacity();
        let capacity = f64::from(burst);
        let rate = policy.refill_rate_per_second();
        let (tokens, last_refill_at) = match *state {
            RateLimitState::TokenBucket { tokens, last_refill_at } => (tokens, last_refill_at),
            _ => (capacity, now),
        };

        // Refill. A clock that stepped backwards refills nothing and keeps the
        // later timestamp so the same interval is never credited twice.
        let elapsed_secs = now.saturating_sub(last_refill_at) as f64 / 1_000.0;
        let mut tokens = Self::snap((tokens + elapsed_secs * rate).min(capacity));
        let last_refill_at = now.max(last_refill_at);

        let result = if tokens < 1.0 {
            let retry_after = ((1.0 - tokens) / rate - TOKEN_EPSILON).ceil().max(1.0) as u64;
            let reset_at =
                now.saturating_add(Self::millis_until_full(tokens, capacity, rate));
            RateLimitResult::denied(burst, reset_at, retry_after)
        } else {
            tokens -= 1.0;
            let reset_at =
                now.saturating_add(Self::millis_until_full(tokens, capacity, rate));
            RateLimitResult::admitted(burst, tokens.floor() as u32, reset_at)
        };

        *state = RateLimitState::TokenBucket { tokens: tokens.max(0.0), last_refill_at };
        result
    }
}
