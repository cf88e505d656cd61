//! Convenient re-exports for common ratewarden types.
pub use crate::{
    clock::{Clock, ManualClock, SystemClock},
    config::PolicyConfig,
    error::{PolicyError, StoreError},
    presets::Preset,
    rate_limit::{
        wrap, AddressKey, CallerIdentity, EndpointKey, IdentityKey, InMemoryStore, Janitor,
        JanitorHandle, KeyGenerator, RateLimitKey, RateLimitLayer, RateLimitPolicy,
        RateLimitResult, RateLimitService, RateLimiter, RequestContext, StateStore, StrategyKind,
    },
    telemetry::{AdmissionEvent, LogSink, MemorySink, NullSink},
};
pub use tower::Layer;
