#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # ratewarden
//!
//! Request-rate admission control for tower services.
//!
//! ## Features
//!
//! - **Three strategies**: fixed window, sliding window and token bucket
//! - **Pluggable keys** by caller identity, source address or endpoint
//! - **Sharded state store** behind an async trait, in-memory by default
//! - **Tower middleware** with `X-RateLimit-*` headers, 429 rejections and fail-open on store errors
//! - **Presets** for common endpoint classes and a serde config layer
//! - **Janitor** task that evicts idle state
//!
//! ## Quick Start
//!
//! ```rust
//! use ratewarden::prelude::*;
//! use std::time::Duration;
//! use tower::{service_fn, ServiceExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let policy = RateLimitPolicy::builder("api")
//!         .sliding_window(2, Duration::from_secs(1))
//!         .build()?;
//!
//!     let handler = service_fn(|_req: http::Request<String>| async {
//!         Ok::<_, std::convert::Infallible>(http::Response::new(String::from("hello")))
//!     });
//!     let service = RateLimitLayer::from_policy(policy).layer(handler);
//!
//!     let request = || http::Request::builder().uri("/hello").body(String::new()).unwrap();
//!     assert_eq!(service.clone().oneshot(request()).await?.status(), 200);
//!     assert_eq!(service.clone().oneshot(request()).await?.status(), 200);
//!     assert_eq!(service.clone().oneshot(request()).await?.status(), 429);
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod error;
pub mod prelude;
pub mod presets;
pub mod rate_limit;
pub mod telemetry;

// Re-exports
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{KeyKind, PolicyConfig};
pub use error::{PolicyError, StoreError};
pub use presets::Preset;
pub use rate_limit::{
    RateLimitKey, RateLimitLayer, RateLimitPolicy, RateLimitResult, RateLimitService,
    RateLimitState, RateLimiter,
};
