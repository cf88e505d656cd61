//! Telemetry for admission decisions.
//!
//! Every evaluation a [`RateLimiter`](crate::rate_limit::RateLimiter) performs
//! emits an [`AdmissionEvent`]. Events flow through `TelemetrySink`
//! implementations which can log, collect, or forward them.
//!
//! # Telemetry Sinks
//!
//! The `TelemetrySink` trait is a `tower::Service<AdmissionEvent>` for
//! composability. Emission is best effort: a sink that is not ready or fails
//! loses the event and never affects the admission decision.

pub mod events;
pub mod sinks;

pub use events::{event_to_json, AdmissionEvent};
pub use sinks::{emit_best_effort, LogSink, MemorySink, NullSink, TelemetrySink};
