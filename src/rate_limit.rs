//! Rate limiting primitives.
//!
//! This module provides the building blocks for admission control:
//! - [`KeyGenerator`]: derives a [`RateLimitKey`] from a [`RequestContext`].
//! - [`StateStore`]: keyed, concurrency-safe storage of [`RateLimitState`].
//! - [`Strategy`]: the decision math (fixed window, sliding window, token bucket).
//! - [`RateLimitPolicy`]: binds a strategy, its parameters and a key generator.
//! - [`RateLimiter`]: evaluates a policy against a store.
//! - [`RateLimitLayer`]: tower middleware that enforces the limit on HTTP services.
//! - [`Janitor`]: background sweep that evicts idle state.
//!
//! # Architecture
//!
//! The system is designed to be modular:
//! - **Middleware**: `RateLimitLayer` wraps your service. It doesn't know *how* limiting works,
//!   only that it should ask a `RateLimiter`.
//! - **Logic**: `FixedWindowStrategy`, `SlidingWindowStrategy` and `TokenBucketStrategy`
//!   (in `strategies`) handle the math. They are pure functions of `(state, policy, now)`.
//! - **Storage**: `StateStore` (in `store`) owns the state, enabling in-memory or shared
//!   backends without touching the strategies.

use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

pub mod janitor;
pub mod key;
pub mod limiter;
pub mod middleware;
pub mod policy;
pub mod store;
pub mod strategies;

pub use janitor::{Janitor, JanitorHandle, SweepReport};
pub use key::{
    AddressKey, CallerIdentity, EndpointKey, IdentityKey, KeyFn, KeyGenerator, RequestContext,
};
pub use limiter::RateLimiter;
pub use middleware::{wrap, RateLimitLayer, RateLimitService, RejectionBuilder};
pub use policy::{RateLimitPolicy, RateLimitPolicyBuilder};
pub use store::{InMemoryStore, StateStore};
pub use strategies::{
    FixedWindowStrategy, SlidingWindowStrategy, Strategy, StrategyKind, TokenBucketStrategy,
};

/// Identity (caller + resource) a limit is tracked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey(String);

impl RateLimitKey {
    /// Create a key from any string.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Borrow the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RateLimitKey {
    fn from(key: &str) -> Self {
        Self(key.to_owned())
    }
}

impl From<String> for RateLimitKey {
    fn from(key: String) -> Self {
        Self(key)
    }
}

/// Per-key mutable state. The variant depends on the strategy that owns the key.
///
/// All timestamps are epoch milliseconds as reported by the limiter's
/// [`Clock`](crate::clock::Clock).
#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitState {
    /// Counter for the current window.
    FixedWindow {
        /// Requests admitted in the current window.
        count: u32,
        /// When the current window ends.
        window_reset_at: u64,
    },
    /// Admission timestamps inside the trailing window, oldest first.
    SlidingWindow {
        /// Timestamps of admitted requests.
        request_timestamps: VecDeque<u64>,
    },
    /// Token level at the last refill.
    TokenBucket {
        /// Tokens available, `0.0 ..= burst_capacity`.
        tokens: f64,
        /// When `tokens` was last brought up to date.
        last_refill_at: u64,
    },
}

impl RateLimitState {
    /// Which strategy produced this state.
    pub fn kind(&self) -> StrategyKind {
        match self {
            RateLimitState::FixedWindow { .. } => StrategyKind::FixedWindow,
            RateLimitState::SlidingWindow { .. } => StrategyKind::SlidingWindow,
            RateLimitState::TokenBucket { .. } => StrategyKind::TokenBucket,
        }
    }

    /// Whether this entry has had no relevance for at least `grace_ms` and can be
    /// evicted without changing any future decision.
    ///
    /// - fixed window: the window ended at least `grace_ms` ago
    /// - sliding window: no timestamps, or the newest is `grace_ms` old
    /// - token bucket: untouched for `grace_ms` (with `grace_ms` at least the
    ///   time-to-full, a fresh bucket is indistinguishable)
    pub fn is_expired(&self, now: u64, grace_ms: u64) -> bool {
        match self {
            RateLimitState::FixedWindow { window_reset_at, .. } => {
                now >= window_reset_at.saturating_add(grace_ms)
            }
            RateLimitState::SlidingWindow { request_timestamps } => match request_timestamps.back()
            {
                None => true,
                Some(newest) => newest.saturating_add(grace_ms) <= now,
            },
            RateLimitState::TokenBucket { last_refill_at, .. } => {
                last_refill_at.saturating_add(grace_ms) <= now
            }
        }
    }
}

/// The verdict of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitResult {
    /// Whether the request may proceed.
    pub admitted: bool,
    /// The ceiling reported to callers (`max_requests`, or burst capacity for token bucket).
    pub limit: u32,
    /// Requests left before the next denial.
    pub remaining: u32,
    /// Epoch milliseconds of the next window reset or refill milestone.
    pub reset_at: u64,
    /// Seconds to wait before retrying. Only set when denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    /// An admitted verdict.
    pub fn admitted(limit: u32, remaining: u32, reset_at: u64) -> Self {
        Self { admitted: true, limit, remaining, reset_at, retry_after_secs: None }
    }

    /// A denied verdict; `retry_after_secs` is clamped to at least one second.
    pub fn denied(limit: u32, reset_at: u64, retry_after_secs: u64) -> Self {
        Self {
            admitted: false,
            limit,
            remaining: 0,
            reset_at,
            retry_after_secs: Some(retry_after_secs.max(1)),
        }
    }

    /// Helper to check if admitted.
    pub fn is_admitted(&self) -> bool {
        self.admitted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denied_result_never_advertises_zero_retry() {
        let r = RateLimitResult::denied(10, 5_000, 0);
        assert!(!r.is_admitted());
        assert_eq!(r.retry_after_secs, Some(1));
        assert_eq!(r.remaining, 0);
    }

    #[test]
    fn result_serializes_camel_case_without_retry_when_admitted() {
        let v = serde_json::to_value(RateLimitResult::admitted(3, 2, 1_000)).unwrap();
        assert_eq!(v["resetAt"], 1_000);
        assert_eq!(v["remaining"], 2);
        assert!(v.get("retryAfterSecs").is_none());
    }

    #[test]
    fn fixed_window_expires_one_grace_after_reset() {
        let s = RateLimitState::FixedWindow { count: 3, window_reset_at: 1_000 };
        assert!(!s.is_expired(1_500, 1_000));
        assert!(s.is_expired(2_000, 1_000));
    }

    #[test]
    fn sliding_window_expiry_tracks_newest_timestamp() {
        let empty = RateLimitState::SlidingWindow { request_timestamps: VecDeque::new() };
        assert!(empty.is_expired(0, 1_000));

        let s = RateLimitState::SlidingWindow { request_timestamps: VecDeque::from(vec![0, 900]) };
        assert!(!s.is_expired(1_500, 1_000));
        assert!(s.is_expired(1_900, 1_000));
    }

    #[test]
    fn token_bucket_expiry_tracks_last_refill() {
        let s = RateLimitState::TokenBucket { tokens: 0.0, last_refill_at: 100 };
        assert!(!s.is_expired(5_099, 5_000));
        assert!(s.is_expired(5_100, 5_000));
        assert_eq!(s.kind(), StrategyKind::TokenBucket);
    }

    #[test]
    fn key_conversions_and_display() {
        let a = RateLimitKey::from("user:42:/analyze");
        let b = RateLimitKey::new(String::from("user:42:/analyze"));
        assert_eq!(a, b);
        assert_eq!(a.to_string(), "user:42:/analyze");
        assert_eq!(a.as_str(), "user:42:/analyze");
    }
}
