//! Serializable policy descriptions.
//!
//! Hosts that keep limits in their own configuration files can deserialize a
//! [`PolicyConfig`] with any serde format and turn it into a validated
//! [`RateLimitPolicy`]:
//!
//! ```rust
//! use ratewarden::config::PolicyConfig;
//!
//! let cfg: PolicyConfig = serde_json::from_str(r#"{
//!     "name": "uploads",
//!     "strategy": "token_bucket",
//!     "max_requests": 20,
//!     "window_ms": 60000,
//!     "burst_capacity": 5,
//!     "key": "identity"
//! }"#).unwrap();
//! let policy = cfg.into_policy().unwrap();
//! assert_eq!(policy.limit(), 5);
//! ```
//!
//! A config naming a `preset` starts from that preset; any other field that is
//! set overrides it.

use crate::error::PolicyError;
use crate::presets::Preset;
use crate::rate_limit::{
    AddressKey, EndpointKey, IdentityKey, RateLimitPolicy, RateLimitPolicyBuilder, StrategyKind,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which built-in key generator a policy uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    #[default]
    Identity,
    Address,
    Endpoint,
}

/// Declarative form of a [`RateLimitPolicy`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PolicyConfig {
    /// Policy name; defaults to the preset name, else `"custom"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Start from a named preset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_requests: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub burst_capacity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refill_rate_per_second: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_headers: Option<bool>,
    /// Exact paths exempt from limiting, added to any the preset skips.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skip_paths: Vec<String>,
}

impl PolicyConfig {
    /// Describe an existing preset.
    pub fn from_preset(preset: Preset) -> Self {
        Self { preset: Some(preset.name().to_owned()), ..Self::default() }
    }

    /// Validate and build the policy.
    pub fn into_policy(self) -> Result<RateLimitPolicy, PolicyError> {
        let preset = self.preset.as_deref().map(str::parse::<Preset>).transpose()?;
        let name = self
            .name
            .clone()
            .or_else(|| preset.map(|p| p.name().to_owned()))
            .unwrap_or_else(|| "custom".to_owned());

        let builder = match preset {
            Some(preset) => self.apply(preset_builder(preset, name)),
            None => self.apply(RateLimitPolicy::builder(name)),
        };
        builder.build()
    }

    fn apply(self, mut builder: RateLimitPolicyBuilder) -> RateLimitPolicyBuilder {
        if let Some(kind) = self.strategy {
            builder = builder.strategy(kind);
        }
        if let Some(max) = self.max_requests {
            builder = builder.max_requests(max);
        }
        if let Some(ms) = self.window_ms {
            builder = builder.window(Duration::from_millis(ms));
        }
        if let Some(burst) = self.burst_capacity {
            builder = builder.burst_capacity(burst);
        }
        if let Some(rate) = self.refill_rate_per_second {
            builder = builder.refill_rate_per_second(rate);
        }
        builder = match self.key {
            Some(KeyKind::Identity) => builder.key_generator(IdentityKey),
            Some(KeyKind::Address) => builder.key_generator(AddressKey),
            Some(KeyKind::Endpoint) => builder.key_generator(EndpointKey),
            None => builder,
        };
        if let Some(include) = self.include_headers {
            builder = builder.include_headers(include);
        }
        builder.skip_paths(self.skip_paths)
    }
}

// Builder pre-loaded with a preset's parameters, renamed to `name`.
fn preset_builder(preset: Preset, name: String) -> RateLimitPolicyBuilder {
    let base = preset.policy();
    let mut builder = RateLimitPolicy::builder(name)
        .strategy(base.strategy_kind())
        .max_requests(base.max_requests())
        .window(base.window())
        .include_headers(base.include_headers());
    if base.strategy_kind() == StrategyKind::TokenBucket {
        builder = builder
            .burst_capacity(base.burst_capacity())
            .refill_rate_per_second(base.refill_rate_per_second());
    }
    builder = match preset {
        Preset::DefaultApi | Preset::AiAnalysis => builder.key_generator(IdentityKey),
        Preset::StrictAuth | Preset::PublicRead => builder.key_generator(AddressKey),
    };
    builder.skip_when(move |ctx| base.should_skip(ctx))
}
