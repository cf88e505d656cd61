//! Throttling key derivation.
//!
//! Generators are pure functions of a [`RequestContext`] and never fail: a
//! caller that cannot be identified lands on a shared fallback key.

use crate::rate_limit::RateLimitKey;
use std::borrow::Cow;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Sentinel address for callers with no forwarded or peer address.
pub const UNKNOWN_ADDRESS: &str = "unknown";

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Authenticated caller id, inserted into request extensions by the host's auth layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallerIdentity(pub String);

/// What a key generator may look at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    /// Caller id if authenticated.
    pub identity: Option<String>,
    /// Raw `X-Forwarded-For` header value.
    pub forwarded_for: Option<String>,
    /// Peer address of the connection.
    pub remote_addr: Option<IpAddr>,
    /// Target path.
    pub path: String,
}

impl RequestContext {
    /// Context for an anonymous request to `path`.
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Self::default() }
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_forwarded_for(mut self, forwarded_for: impl Into<String>) -> Self {
        self.forwarded_for = Some(forwarded_for.into());
        self
    }

    pub fn with_remote_addr(mut self, addr: IpAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Build a context from an HTTP request.
    ///
    /// Reads the [`CallerIdentity`] and [`SocketAddr`] extensions (when the host
    /// inserted them), the `X-Forwarded-For` header and the URI path.
    pub fn from_request<B>(req: &http::Request<B>) -> Self {
        Self {
            identity: req
                .extensions()
                .get::<CallerIdentity>()
                .map(|id| id.0.clone())
                .filter(|id| !id.is_empty()),
            forwarded_for: req
                .headers()
                .get(FORWARDED_FOR)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned),
            remote_addr: req.extensions().get::<SocketAddr>().map(SocketAddr::ip),
            path: req.uri().path().to_owned(),
        }
    }

    /// The caller's address: first `X-Forwarded-For` hop, else the peer
    /// address, else [`UNKNOWN_ADDRESS`].
    pub fn source_address(&self) -> String {
        self.forwarded_for
            .as_deref()
            .and_then(|xff| xff.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty())
            .map(str::to_owned)
            .or_else(|| self.remote_addr.map(|ip| ip.to_string()))
            .unwrap_or_else(|| UNKNOWN_ADDRESS.to_owned())
    }
}

/// Derives the throttling key for a request.
pub trait KeyGenerator: Send + Sync + fmt::Debug {
    fn generate(&self, ctx: &RequestContext) -> RateLimitKey;
}

// Percent-encodes `%` and `:` so a caller segment can never absorb part of
// the path. Keys stay readable for the common case of no `:` in the segment.
fn escape_segment(segment: &str) -> Cow<'_, str> {
    if !segment.contains(|c: char| c == ':' || c == '%') {
        return Cow::Borrowed(segment);
    }
    let mut out = String::with_capacity(segment.len() + 4);
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            ':' => out.push_str("%3A"),
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// `user:{identity}:{path}`, falling back to [`AddressKey`] for anonymous callers.
///
/// `:` and `%` in the identity are percent-encoded.
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityKey;

impl KeyGenerator for IdentityKey {
    fn generate(&self, ctx: &RequestContext) -> RateLimitKey {
        match ctx.identity.as_deref() {
            Some(id) => RateLimitKey::new(format!("user:{}:{}", escape_segment(id), ctx.path)),
            None => AddressKey.generate(ctx),
        }
    }
}

/// `ip:{address}:{path}`. IPv6 colons are percent-encoded like identities.
#[derive(Debug, Default, Clone, Copy)]
pub struct AddressKey;

impl KeyGenerator for AddressKey {
    fn generate(&self, ctx: &RequestContext) -> RateLimitKey {
        RateLimitKey::new(format!("ip:{}:{}", escape_segment(&ctx.source_address()), ctx.path))
    }
}

/// `endpoint:{path}`: every caller shares one budget per route.
#[derive(Debug, Default, Clone, Copy)]
pub struct EndpointKey;

impl KeyGenerator for EndpointKey {
    fn generate(&self, ctx: &RequestContext) -> RateLimitKey {
        RateLimitKey::new(format!("endpoint:{}", ctx.path))
    }
}

/// Adapts a closure into a [`KeyGenerator`].
#[derive(Clone)]
pub struct KeyFn<F> {
    name: &'static str,
    f: F,
}

impl<F> KeyFn<F>
where
    F: Fn(&RequestContext) -> RateLimitKey + Send + Sync,
{
    pub fn new(name: &'static str, f: F) -> Self {
        Self { name, f }
    }
}

impl<F> fmt::Debug for KeyFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFn").field("name", &self.name).finish()
    }
}

impl<F> KeyGenerator for KeyFn<F>
where
    F: Fn(&RequestContext) -> RateLimitKey + Send + Sync,
{
    fn generate(&self, ctx: &RequestContext) -> RateLimitKey {
        (self.f)(ctx)
    }
}
