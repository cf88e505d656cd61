//! Ready-made policies for common endpoint classes.
//!
//! ## Quick Start
//!
//! ```rust
//! use ratewarden::presets;
//! use ratewarden::rate_limit::RateLimitLayer;
//! use tower::{service_fn, Layer};
//!
//! let login = service_fn(|_req: http::Request<String>| async {
//!     Ok::<_, std::convert::Infallible>(http::Response::new(String::from("welcome")))
//! });
//! let guarded = RateLimitLayer::from_policy(presets::strict_auth()).layer(login);
//! # let _ = guarded;
//! ```
//!
//! ## Available Presets
//!
//! - [`default_api`]: general endpoints (sliding window, identity keyed, health checks exempt)
//! - [`strict_auth`]: login and credential endpoints (fixed window, address keyed, long window)
//! - [`ai_analysis`]: expensive model calls (token bucket, small burst, identity keyed)
//! - [`public_read`]: unauthenticated reads (fixed window, address keyed, high ceiling)

use crate::error::PolicyError;
use crate::rate_limit::{AddressKey, IdentityKey, RateLimitPolicy};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_API_MAX_REQUESTS: u32 = 100;
const DEFAULT_API_WINDOW_SECS: u64 = 60;
const DEFAULT_API_HEALTH_PATHS: [&str; 3] = ["/health", "/healthz", "/ready"];

const STRICT_AUTH_MAX_REQUESTS: u32 = 5;
const STRICT_AUTH_WINDOW_SECS: u64 = 15 * 60;

const AI_ANALYSIS_MAX_REQUESTS: u32 = 10;
const AI_ANALYSIS_WINDOW_SECS: u64 = 60;
const AI_ANALYSIS_BURST: u32 = 3;

const PUBLIC_READ_MAX_REQUESTS: u32 = 1_000;
const PUBLIC_READ_WINDOW_SECS: u64 = 60;

/// 100 requests per trailing minute per caller and path.
///
/// Anonymous callers fall back to their address. Health and readiness probes
/// are never counted.
pub fn default_api() -> RateLimitPolicy {
    RateLimitPolicy::builder(Preset::DefaultApi.name())
        .sliding_window(DEFAULT_API_MAX_REQUESTS, Duration::from_secs(DEFAULT_API_WINDOW_SECS))
        .key_generator(IdentityKey)
        .skip_paths(DEFAULT_API_HEALTH_PATHS)
        .assemble()
}

/// 5 attempts per 15 minutes per source address and path.
pub fn strict_auth() -> RateLimitPolicy {
    RateLimitPolicy::builder(Preset::StrictAuth.name())
        .fixed_window(STRICT_AUTH_MAX_REQUESTS, Duration::from_secs(STRICT_AUTH_WINDOW_SECS))
        .key_generator(AddressKey)
        .assemble()
}

/// Bursts of 3, refilled at 10 per minute, per caller and path.
pub fn ai_analysis() -> RateLimitPolicy {
    RateLimitPolicy::builder(Preset::AiAnalysis.name())
        .token_bucket(AI_ANALYSIS_MAX_REQUESTS, Duration::from_secs(AI_ANALYSIS_WINDOW_SECS))
        .burst_capacity(AI_ANALYSIS_BURST)
        .key_generator(IdentityKey)
        .assemble()
}

/// 1000 requests per minute per source address and path.
pub fn public_read() -> RateLimitPolicy {
    RateLimitPolicy::builder(Preset::PublicRead.name())
        .fixed_window(PUBLIC_READ_MAX_REQUESTS, Duration::from_secs(PUBLIC_READ_WINDOW_SECS))
        .key_generator(AddressKey)
        .assemble()
}

/// Named handle for each preset, for selecting one from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Preset {
    DefaultApi,
    StrictAuth,
    AiAnalysis,
    PublicRead,
}

impl Preset {
    pub const ALL: [Preset; 4] =
        [Preset::DefaultApi, Preset::StrictAuth, Preset::AiAnalysis, Preset::PublicRead];

    /// Policy name, also accepted by [`FromStr`].
    pub fn name(self) -> &'static str {
        match self {
            Preset::DefaultApi => "default_api",
            Preset::StrictAuth => "strict_auth",
            Preset::AiAnalysis => "ai_analysis",
            Preset::PublicRead => "public_read",
        }
    }

    pub fn policy(self) -> RateLimitPolicy {
        match self {
            Preset::DefaultApi => default_api(),
            Preset::StrictAuth => strict_auth(),
            Preset::AiAnalysis => ai_analysis(),
            Preset::PublicRead => public_read(),
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = PolicyError;

    /// Accepts the snake_case name; `-` is treated as `_` and case is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == normalized)
            .ok_or_else(|| PolicyError::UnknownPreset(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{RequestContext, StrategyKind};

    #[test]
    fn presets_pass_validation() {
        // Presets skip `build()`; rebuilding the same parameters must succeed.
        for preset in Preset::ALL {
            let p = preset.policy();
            let mut builder = RateLimitPolicy::builder(p.name())
                .strategy(p.strategy_kind())
                .max_requests(p.max_requests())
                .window(p.window());
            if p.strategy_kind() == StrategyKind::TokenBucket {
                builder = builder
                    .burst_capacity(p.burst_capacity())
                    .refill_rate_per_second(p.refill_rate_per_second());
            }
            assert!(builder.build().is_ok(), "{preset}");
        }
    }

    #[test]
    fn default_api_skips_health_checks() {
        let p = default_api();
        assert_eq!(p.strategy_kind(), StrategyKind::SlidingWindow);
        assert_eq!(p.limit(), 100);
        assert!(p.should_skip(&RequestContext::new("/health")));
        assert!(p.should_skip(&RequestContext::new("/ready")));
        assert!(!p.should_skip(&RequestContext::new("/api/documents")));
    }

    #[test]
    fn strict_auth_is_address_keyed_fixed_window() {
        let p = strict_auth();
        assert_eq!(p.strategy_kind(), StrategyKind::FixedWindow);
        assert_eq!(p.max_requests(), 5);
        assert_eq!(p.window(), Duration::from_secs(900));
        let ctx = RequestContext::new("/login").with_identity("u1").with_forwarded_for("192.0.2.1");
        assert_eq!(p.key_for(&ctx).as_str(), "ip:192.0.2.1:/login");
    }

    #[test]
    fn ai_analysis_bursts_three_and_refills_slowly() {
        let p = ai_analysis();
        assert_eq!(p.strategy_kind(), StrategyKind::TokenBucket);
        assert_eq!(p.limit(), 3);
        assert!((p.refill_rate_per_second() - 1.0 / 6.0).abs() < 1e-12);
        // Three tokens at 1/6 per second take 18s to refill.
        let grace = p.idle_grace();
        assert!(grace >= Duration::from_secs(18) && grace <= Duration::from_millis(18_001));
    }

    #[test]
    fn public_read_is_lenient() {
        let p = public_read();
        assert_eq!(p.limit(), 1_000);
        assert!(p.max_requests() > default_api().max_requests());
    }

    #[test]
    fn preset_names_round_trip() {
        for preset in Preset::ALL {
            assert_eq!(preset.name().parse::<Preset>().unwrap(), preset);
            assert_eq!(preset.policy().name(), preset.to_string());
        }
        assert_eq!("Strict-Auth".parse::<Preset>().unwrap(), Preset::StrictAuth);
        assert_eq!(
            "nope".parse::<Preset>().unwrap_err(),
            PolicyError::UnknownPreset("nope".into())
        );
    }
}
