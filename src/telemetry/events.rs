use crate::rate_limit::RateLimitKey;
use serde_json::json;
use std::fmt;

/// Admission events emitted by a [`RateLimiter`](crate::rate_limit::RateLimiter).
///
/// Every evaluated request produces exactly one event. Sinks receive them
/// best effort and may drop any of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionEvent {
    /// The request was within budget.
    Admitted {
        /// Policy that evaluated the request.
        policy: String,
        /// Throttling key.
        key: RateLimitKey,
        /// Requests left after this one.
        remaining: u32,
    },
    /// The request was over budget and rejected.
    Denied {
        /// Policy that evaluated the request.
        policy: String,
        /// Throttling key.
        key: RateLimitKey,
        /// Seconds advertised in `Retry-After`.
        retry_after_secs: u64,
    },
    /// The policy's skip predicate matched; nothing was evaluated.
    Skipped {
        /// Policy whose predicate matched.
        policy: String,
    },
    /// The state store failed and the request was let through.
    FailedOpen {
        /// Policy that tried to evaluate the request.
        policy: String,
        /// Throttling key.
        key: RateLimitKey,
        /// Rendered store error.
        error: String,
    },
}

impl AdmissionEvent {
    /// Name of the policy the event belongs to.
    pub fn policy(&self) -> &str {
        match self {
            AdmissionEvent::Admitted { policy, .. }
            | AdmissionEvent::Denied { policy, .. }
            | AdmissionEvent::Skipped { policy }
            | AdmissionEvent::FailedOpen { policy, .. } => policy,
        }
    }

    /// Key the event refers to; `None` for skipped requests.
    pub fn key(&self) -> Option<&RateLimitKey> {
        match self {
            AdmissionEvent::Admitted { key, .. }
            | AdmissionEvent::Denied { key, .. }
            | AdmissionEvent::FailedOpen { key, .. } => Some(key),
            AdmissionEvent::Skipped { .. } => None,
        }
    }
}

impl fmt::Display for AdmissionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdmissionEvent::Admitted { policy, key, remaining } => {
                write!(f, "Admitted({}, key={}, remaining={})", policy, key, remaining)
            }
            AdmissionEvent::Denied { policy, key, retry_after_secs } => {
                write!(f, "Denied({}, key={}, retry_after={}s)", policy, key, retry_after_secs)
            }
            AdmissionEvent::Skipped { policy } => write!(f, "Skipped({})", policy),
            AdmissionEvent::FailedOpen { policy, key, error } => {
                write!(f, "FailedOpen({}, key={}, error={})", policy, key, error)
            }
        }
    }
}

/// Convert an [`AdmissionEvent`] into a JSON value for sinks.
pub fn event_to_json(event: &AdmissionEvent) -> serde_json::Value {
    match event {
        AdmissionEvent::Admitted { policy, key, remaining } => json!({
            "kind": "admitted",
            "policy": policy,
            "key": key.as_str(),
            "remaining": *remaining,
        }),
        AdmissionEvent::Denied { policy, key, retry_after_secs } => json!({
            "kind": "denied",
            "policy": policy,
            "key": key.as_str(),
            "retry_after_secs": *retry_after_secs,
        }),
        AdmissionEvent::Skipped { policy } => json!({ "kind": "skipped", "policy": policy }),
        AdmissionEvent::FailedOpen { policy, key, error } => json!({
            "kind": "failed_open",
            "policy": policy,
            "key": key.as_str(),
            "error": error,
        }),
    }
}
