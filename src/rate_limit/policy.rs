use crate::error::PolicyError;
use crate::rate_limit::{
    IdentityKey, KeyGenerator, RateLimitKey, RejectionBuilder, RequestContext, Strategy,
    StrategyKind,
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

type SkipPredicate = Arc<dyn Fn(&RequestContext) -> bool + Send + Sync>;

const DEFAULT_MAX_REQUESTS: u32 = 100;
const DEFAULT_WINDOW_SECS: u64 = 60;

/// Immutable description of one rate limit: algorithm, budget, keying and
/// response shaping.
///
/// ```rust
/// use ratewarden::rate_limit::{AddressKey, RateLimitPolicy};
/// use std::time::Duration;
///
/// let policy = RateLimitPolicy::builder("login")
///     .fixed_window(5, Duration::from_secs(15 * 60))
///     .key_generator(AddressKey)
///     .build()
///     .unwrap();
/// assert_eq!(policy.limit(), 5);
/// ```
#[derive(Clone)]
pub struct RateLimitPolicy {
    name: String,
    kind: StrategyKind,
    strategy: Arc<dyn Strategy>,
    max_requests: u32,
    window: Duration,
    burst_capacity: Option<u32>,
    refill_rate_per_second: Option<f64>,
    key_generator: Arc<dyn KeyGenerator>,
    include_headers: bool,
    rejection: Option<Arc<dyn RejectionBuilder>>,
    skip: Option<SkipPredicate>,
}

impl std::fmt::Debug for RateLimitPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitPolicy")
            .field("name", &self.name)
            .field("strategy", &self.kind)
            .field("max_requests", &self.max_requests)
            .field("window", &self.window)
            .field("burst_capacity", &self.burst_capacity)
            .field("refill_rate_per_second", &self.refill_rate_per_second)
            .field("key_generator", &self.key_generator)
            .field("include_headers", &self.include_headers)
            .field("rejection", &self.rejection.as_ref().map(|_| "<builder>"))
            .field("skip", &self.skip.as_ref().map(|_| "<predicate>"))
            .finish()
    }
}

impl RateLimitPolicy {
    /// Start building a policy named `name`.
    pub fn builder(name: impl Into<String>) -> RateLimitPolicyBuilder {
        RateLimitPolicyBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strategy_kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn strategy(&self) -> &dyn Strategy {
        self.strategy.as_ref()
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Window length in milliseconds, saturating at `u64::MAX`.
    pub fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }

    /// Bucket capacity; `max_requests` unless overridden.
    pub fn burst_capacity(&self) -> u32 {
        self.burst_capacity.unwrap_or(self.max_requests)
    }

    /// Tokens added per second; `max_requests / window` unless overridden.
    pub fn refill_rate_per_second(&self) -> f64 {
        self.refill_rate_per_second
            .unwrap_or_else(|| f64::from(self.max_requests) / self.window.as_secs_f64())
    }

    /// The ceiling advertised in `X-RateLimit-Limit`.
    pub fn limit(&self) -> u32 {
        match self.kind {
            StrategyKind::TokenBucket => self.burst_capacity(),
            StrategyKind::FixedWindow | StrategyKind::SlidingWindow => self.max_requests,
        }
    }

    /// How long a key must sit idle before its state can be dropped without
    /// changing any later decision.
    ///
    /// One window for the window strategies; the time an empty bucket needs to
    /// refill completely for the token bucket.
    pub fn idle_grace(&self) -> Duration {
        match self.kind {
            StrategyKind::FixedWindow | StrategyKind::SlidingWindow => self.window,
            StrategyKind::TokenBucket => {
                let secs = f64::from(self.burst_capacity()) / self.refill_rate_per_second();
                Duration::from_millis((secs * 1_000.0).ceil() as u64)
            }
        }
    }

    pub fn include_headers(&self) -> bool {
        self.include_headers
    }

    pub fn rejection(&self) -> Option<&dyn RejectionBuilder> {
        self.rejection.as_deref()
    }

    pub fn key_generator(&self) -> &dyn KeyGenerator {
        self.key_generator.as_ref()
    }

    /// Derive the throttling key for a request.
    pub fn key_for(&self, ctx: &RequestContext) -> RateLimitKey {
        self.key_generator.generate(ctx)
    }

    /// Whether the request bypasses evaluation entirely.
    pub fn should_skip(&self, ctx: &RequestContext) -> bool {
        self.skip.as_ref().is_some_and(|skip| skip(ctx))
    }
}

/// Builder for [`RateLimitPolicy`].
///
/// Defaults: fixed window, 100 requests per 60 seconds, identity keyed,
/// headers on, no skip predicate.
pub struct RateLimitPolicyBuilder {
    name: String,
    kind: StrategyKind,
    max_requests: u32,
    window: Duration,
    burst_capacity: Option<u32>,
    refill_rate_per_second: Option<f64>,
    key_generator: Arc<dyn KeyGenerator>,
    include_headers: bool,
    rejection: Option<Arc<dyn RejectionBuilder>>,
    skip: Option<SkipPredicate>,
}

impl RateLimitPolicyBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: StrategyKind::FixedWindow,
            max_requests: DEFAULT_MAX_REQUESTS,
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            burst_capacity: None,
            refill_rate_per_second: None,
            key_generator: Arc::new(IdentityKey),
            include_headers: true,
            rejection: None,
            skip: None,
        }
    }

    /// Select the algorithm.
    pub fn strategy(mut self, kind: StrategyKind) -> Self {
        self.kind = kind;
        self
    }

    /// Requests admitted per window. Must be > 0.
    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = max_requests;
        self
    }

    /// Window length. Must be at least one millisecond.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// `max_requests` per non-overlapping `window`.
    pub fn fixed_window(self, max_requests: u32, window: Duration) -> Self {
        self.strategy(StrategyKind::FixedWindow).max_requests(max_requests).window(window)
    }

    /// `max_requests` per trailing `window`.
    pub fn sliding_window(self, max_requests: u32, window: Duration) -> Self {
        self.strategy(StrategyKind::SlidingWindow).max_requests(max_requests).window(window)
    }

    /// Steady rate of `max_requests` per `window`; tune the burst with
    /// [`burst_capacity`](Self::burst_capacity).
    pub fn token_bucket(self, max_requests: u32, window: Duration) -> Self {
        self.strategy(StrategyKind::TokenBucket).max_requests(max_requests).window(window)
    }

    /// Token bucket capacity. Must be > 0.
    pub fn burst_capacity(mut self, burst: u32) -> Self {
        self.burst_capacity = Some(burst);
        self
    }

    /// Token bucket refill rate. Must be > 0 and finite.
    pub fn refill_rate_per_second(mut self, rate: f64) -> Self {
        self.refill_rate_per_second = Some(rate);
        self
    }

    pub fn key_generator<K>(mut self, generator: K) -> Self
    where
        K: KeyGenerator + 'static,
    {
        self.key_generator = Arc::new(generator);
        self
    }

    /// Toggle the `X-RateLimit-*` response headers.
    pub fn include_headers(mut self, include: bool) -> Self {
        self.include_headers = include;
        self
    }

    /// Replace the default 429 response.
    pub fn rejection<R>(mut self, builder: R) -> Self
    where
        R: RejectionBuilder + 'static,
    {
        self.rejection = Some(Arc::new(builder));
        self
    }

    /// Bypass evaluation when `predicate` holds. Repeated calls are OR-ed.
    pub fn skip_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
    {
        let predicate: SkipPredicate = Arc::new(predicate);
        self.skip = Some(match self.skip.take() {
            None => predicate,
            Some(prev) => Arc::new(move |ctx: &RequestContext| prev(ctx) || predicate(ctx)),
        });
        self
    }

    /// Bypass evaluation for exact path matches.
    pub fn skip_paths<I, S>(self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: HashSet<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return self;
        }
        self.skip_when(move |ctx| paths.contains(&ctx.path))
    }

    /// Validate and build.
    pub fn build(self) -> Result<RateLimitPolicy, PolicyError> {
        if self.max_requests == 0 {
            return Err(PolicyError::InvalidMaxRequests { policy: self.name });
        }
        if self.window < Duration::from_millis(1) {
            return Err(PolicyError::InvalidWindow { policy: self.name, window: self.window });
        }
        if self.burst_capacity == Some(0) {
            return Err(PolicyError::InvalidBurstCapacity { policy: self.name });
        }
        if let Some(rate) = self.refill_rate_per_second {
            if !(rate.is_finite() && rate > 0.0) {
                return Err(PolicyError::InvalidRefillRate { policy: self.name, provided: rate });
            }
        }

        Ok(self.assemble())
    }

    /// Build without validating. Only for parameters known to be valid.
    pub(crate) fn assemble(self) -> RateLimitPolicy {
        RateLimitPolicy {
            strategy: self.kind.strategy(),
            name: self.name,
            kind: self.kind,
            max_requests: self.max_requests,
            window: self.window,
            burst_capacity: self.burst_capacity,
            refill_rate_per_second: self.refill_rate_per_second,
            key_generator: self.key_generator,
            include_headers: self.include_headers,
            rejection: self.rejection,
            skip: self.skip,
        }
    }
}
