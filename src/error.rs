//! Error types for admission control.
//!
//! Only two things can go wrong: a policy is misconfigured (caught when it is
//! built, never at request time), or the state store cannot be reached. Being
//! over the limit is not an error; it is a denied [`RateLimitResult`].
//!
//! [`RateLimitResult`]: crate::rate_limit::RateLimitResult
use std::time::Duration;

/// Errors produced when validating a [`RateLimitPolicy`](crate::rate_limit::RateLimitPolicy).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PolicyError {
    /// `max_requests` must be > 0.
    #[error("max_requests must be > 0 (policy {policy})")]
    InvalidMaxRequests {
        /// Policy being built.
        policy: String,
    },
    /// The window must be at least one millisecond.
    #[error("window must be at least 1ms (policy {policy}, got {window:?})")]
    InvalidWindow {
        /// Policy being built.
        policy: String,
        /// Value provided by caller.
        window: Duration,
    },
    /// Refill rate must be positive and finite.
    #[error("refill_rate_per_second must be > 0 and finite (policy {policy}, got {provided})")]
    InvalidRefillRate {
        /// Policy being built.
        policy: String,
        /// Value provided by caller.
        provided: f64,
    },
    /// Burst capacity must be > 0.
    #[error("burst_capacity must be > 0 (policy {policy})")]
    InvalidBurstCapacity {
        /// Policy being built.
        policy: String,
    },
    /// A named preset does not exist.
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}

/// Failures of the state store backing a limiter.
///
/// The admission middleware never surfaces these to the end caller; it logs
/// them and fails open.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("state store unavailable: {0}")]
    Unavailable(String),
    /// The backend answered with an error.
    #[error("state store backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wrap an arbitrary backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }

    /// Check if this error means the backend was unreachable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn policy_error_display_names_policy() {
        let err = PolicyError::InvalidRefillRate { policy: "ai".into(), provided: -1.0 };
        let msg = err.to_string();
        assert!(msg.contains("refill_rate_per_second"));
        assert!(msg.contains("ai"));
        assert!(msg.contains("-1"));
    }

    #[test]
    fn window_error_display_includes_duration() {
        let err = PolicyError::InvalidWindow { policy: "p".into(), window: Duration::ZERO };
        assert!(err.to_string().contains("0ns"));
    }

    #[test]
    fn backend_error_keeps_source() {
        let err = StoreError::backend(io::Error::new(io::ErrorKind::Other, "connection reset"));
        assert!(!err.is_unavailable());
        assert!(err.to_string().contains("connection reset"));
        assert!(err.source().is_some());
    }

    #[test]
    fn unavailable_predicate() {
        let err = StoreError::Unavailable("redis down".into());
        assert!(err.is_unavailable());
        assert!(err.source().is_none());
    }
}
