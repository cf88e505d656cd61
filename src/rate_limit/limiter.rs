use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::rate_limit::{
    InMemoryStore, Janitor, RateLimitKey, RateLimitPolicy, RateLimitResult, RateLimitState,
    RequestContext, StateStore,
};
use crate::telemetry::{emit_best_effort, AdmissionEvent, TelemetrySink};
use std::sync::Arc;
use tower::util::BoxCloneSyncService;
use tower::ServiceExt;

type BoxSink = BoxCloneSyncService<AdmissionEvent, (), ()>;

/// Evaluates one [`RateLimitPolicy`] against a [`StateStore`].
///
/// Cheap to clone; clones share the store, clock and sink.
///
/// ```rust
/// use ratewarden::rate_limit::{RateLimitPolicy, RateLimiter};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let policy = RateLimitPolicy::builder("demo")
///     .fixed_window(2, Duration::from_secs(1))
///     .build()
///     .unwrap();
/// let limiter = RateLimiter::new(policy);
/// let key = "user:42:/demo".into();
/// assert!(limiter.check(&key).await.unwrap().admitted);
/// assert!(limiter.check(&key).await.unwrap().admitted);
/// assert!(!limiter.check(&key).await.unwrap().admitted);
/// # }
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    policy: Arc<RateLimitPolicy>,
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    sink: Option<BoxSink>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("policy", &self.policy.name())
            .field("store", &self.store)
            .field("clock", &self.clock)
            .field("sink", &self.sink.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

impl RateLimiter {
    /// Limiter backed by a fresh [`InMemoryStore`] and the system clock.
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy: Arc::new(policy),
            store: Arc::new(InMemoryStore::new()),
            clock: Arc::new(SystemClock),
            sink: None,
        }
    }

    /// Use `store` for state. Several limiters may share one store as long as
    /// their key generators do not produce overlapping keys.
    pub fn with_store<S>(mut self, store: S) -> Self
    where
        S: StateStore + 'static,
    {
        self.store = Arc::new(store);
        self
    }

    /// Share an already type-erased store.
    pub fn with_shared_store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_clock<C>(mut self, clock: C) -> Self
    where
        C: Clock + 'static,
    {
        self.clock = Arc::new(clock);
        self
    }

    /// Emit an [`AdmissionEvent`] to `sink` for every decision.
    pub fn with_sink<S>(mut self, sink: S) -> Self
    where
        S: TelemetrySink + Sync,
        S::Future: Send + 'static,
    {
        self.sink = Some(BoxCloneSyncService::new(sink.map_err(|_| ())));
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Evaluate one request against `key`, mutating its state exactly once.
    ///
    /// Being over the limit is an `Ok` denied result; `Err` means the store
    /// could not be used and no decision was made.
    pub async fn check(&self, key: &RateLimitKey) -> Result<RateLimitResult, StoreError> {
        let policy: &RateLimitPolicy = &self.policy;
        let strategy = policy.strategy();
        let now = self.clock.now_millis();
        let init = strategy.initial_state(policy, now);
        let mut evaluate = |state: &mut RateLimitState| strategy.evaluate(state, policy, now);

        let result = self.store.update(key, init, &mut evaluate).await?;

        tracing::trace!(
            policy = policy.name(),
            key = %key,
            admitted = result.admitted,
            remaining = result.remaining,
            reset_at = result.reset_at,
            "rate limit evaluated"
        );
        let event = match result.retry_after_secs {
            None => AdmissionEvent::Admitted {
                policy: policy.name().to_owned(),
                key: key.clone(),
                remaining: result.remaining,
            },
            Some(retry_after_secs) => {
                tracing::debug!(
                    policy = policy.name(),
                    key = %key,
                    retry_after_secs,
                    "rate limit exceeded"
                );
                AdmissionEvent::Denied {
                    policy: policy.name().to_owned(),
                    key: key.clone(),
                    retry_after_secs,
                }
            }
        };
        self.emit(event).await;
        Ok(result)
    }

    /// Resolve the request's key and evaluate it.
    ///
    /// Returns `Ok(None)` without touching the store when the policy's skip
    /// predicate matches.
    pub async fn check_request(
        &self,
        ctx: &RequestContext,
    ) -> Result<Option<RateLimitResult>, StoreError> {
        if self.policy.should_skip(ctx) {
            self.emit(AdmissionEvent::Skipped { policy: self.policy.name().to_owned() }).await;
            return Ok(None);
        }
        let key = self.policy.key_for(ctx);
        self.check(&key).await.map(Some)
    }

    /// Current state of `key` without evaluating a request.
    pub async fn peek(&self, key: &RateLimitKey) -> Result<Option<RateLimitState>, StoreError> {
        self.store.get(key).await
    }

    /// Forget `key`, restoring its full budget. Returns `true` if it was tracked.
    pub async fn reset(&self, key: &RateLimitKey) -> Result<bool, StoreError> {
        let removed = self.store.delete(key).await?;
        if removed {
            tracing::debug!(policy = self.policy.name(), key = %key, "rate limit reset");
        }
        Ok(removed)
    }

    /// A janitor over this limiter's store, with a grace period derived from
    /// the policy and sharing the limiter's clock.
    pub fn janitor(&self) -> Janitor {
        Janitor::new(self.store.clone(), self.policy.idle_grace()).with_clock(self.clock.clone())
    }

    pub(crate) async fn emit(&self, event: AdmissionEvent) {
        if let Some(sink) = &self.sink {
            emit_best_effort(sink.clone(), event).await;
        }
    }
}
