#![allow(dead_code)]

use async_trait::async_trait;
use http::{Request, Response};
use ratewarden::rate_limit::store::{StateOp, StatePredicate};
use ratewarden::rate_limit::{CallerIdentity, InMemoryStore, StateStore};
use ratewarden::{RateLimitKey, RateLimitResult, RateLimitState, StoreError};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tower::util::BoxCloneService;
use tower::service_fn;

pub type Handler = BoxCloneService<Request<String>, Response<String>, Infallible>;

/// Handler that counts its invocations and answers 200 "ok".
pub fn counting_handler() -> (Handler, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let svc = service_fn(move |_req: Request<String>| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Infallible>(Response::new("ok".to_string()))
        }
    });
    (BoxCloneService::new(svc), calls)
}

pub fn anonymous(path: &str, addr: &str) -> Request<String> {
    Request::builder()
        .uri(path)
        .header("x-forwarded-for", addr)
        .body(String::new())
        .unwrap()
}

pub fn as_user(path: &str, user: &str) -> Request<String> {
    let mut req = Request::builder().uri(path).body(String::new()).unwrap();
    req.extensions_mut().insert(CallerIdentity(user.to_string()));
    req
}

/// In-memory store that can be switched into a failing mode.
#[derive(Debug, Clone, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    failing: Arc<AtomicBool>,
    attempts: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn always_failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of `update` calls seen, failed or not.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn get(&self, key: &RateLimitKey) -> Result<Option<RateLimitState>, StoreError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn get_or_create(
        &self,
        key: &RateLimitKey,
        init: RateLimitState,
    ) -> Result<RateLimitState, StoreError> {
        self.check()?;
        self.inner.get_or_create(key, init).await
    }

    async fn update(
        &self,
        key: &RateLimitKey,
        init: RateLimitState,
        op: StateOp<'_>,
    ) -> Result<RateLimitResult, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.inner.update(key, init, op).await
    }

    async fn delete(&self, key: &RateLimitKey) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn delete_if(
        &self,
        key: &RateLimitKey,
        predicate: StatePredicate<'_>,
    ) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.delete_if(key, predicate).await
    }

    async fn snapshot(&self) -> Result<Vec<(RateLimitKey, RateLimitState)>, StoreError> {
        self.check()?;
        self.inner.snapshot().await
    }

    async fn len(&self) -> Result<usize, StoreError> {
        self.check()?;
        self.inner.len().await
    }
}
