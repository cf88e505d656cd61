use crate::rate_limit::{RateLimitPolicy, RateLimitResult, RateLimiter, RequestContext};
use crate::telemetry::AdmissionEvent;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, RETRY_AFTER};
use http::{Request, Response, StatusCode};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower_layer::Layer;
use tower_service::Service;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Builds the response sent in place of a rejected request.
///
/// Implemented for any `Fn(&RateLimitResult, &RateLimitPolicy) -> Response<String>`.
pub trait RejectionBuilder: Send + Sync {
    fn build(&self, result: &RateLimitResult, policy: &RateLimitPolicy) -> Response<String>;
}

impl<F> RejectionBuilder for F
where
    F: Fn(&RateLimitResult, &RateLimitPolicy) -> Response<String> + Send + Sync,
{
    fn build(&self, result: &RateLimitResult, policy: &RateLimitPolicy) -> Response<String> {
        self(result, policy)
    }
}

/// A layer that enforces a [`RateLimitPolicy`] on HTTP services.
#[derive(Clone, Debug)]
pub struct RateLimitLayer {
    limiter: RateLimiter,
}

impl RateLimitLayer {
    pub fn new(limiter: RateLimiter) -> Self {
        Self { limiter }
    }

    /// Layer over a fresh in-memory limiter for `policy`.
    pub fn from_policy(policy: RateLimitPolicy) -> Self {
        Self::new(RateLimiter::new(policy))
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, service: S) -> Self::Service {
        RateLimitService { inner: service, limiter: self.limiter.clone() }
    }
}

/// Wrap `service` so every request is admitted or rejected under `policy`.
pub fn wrap<S>(service: S, policy: RateLimitPolicy) -> RateLimitService<S> {
    RateLimitLayer::from_policy(policy).layer(service)
}

/// Middleware service that enforces rate limits.
///
/// - Skipped requests go straight to the inner service.
/// - Admitted requests are forwarded; the response gets `X-RateLimit-*`
///   headers unless the policy disables them.
/// - Denied requests never reach the inner service and get a 429.
/// - If the store fails the request is forwarded anyway (fail open).
///
/// Errors from the inner service pass through unchanged.
#[derive(Clone, Debug)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: RateLimiter,
}

impl<S> RateLimitService<S> {
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for RateLimitService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: From<String> + Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        // The readied service handles this request; the clone takes its place.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let limiter = self.limiter.clone();

        Box::pin(async move {
            let policy = limiter.policy();
            let ctx = RequestContext::from_request(&req);

            if policy.should_skip(&ctx) {
                limiter.emit(AdmissionEvent::Skipped { policy: policy.name().to_owned() }).await;
                return inner.call(req).await;
            }

            let key = policy.key_for(&ctx);
            match limiter.check(&key).await {
                Ok(result) if result.admitted => {
                    let mut response = inner.call(req).await?;
                    if policy.include_headers() {
                        insert_metadata(response.headers_mut(), &result);
                    }
                    Ok(response)
                }
                Ok(result) => Ok(reject(&result, policy).map(ResBody::from)),
                Err(error) => {
                    tracing::warn!(
                        policy = policy.name(),
                        key = %key,
                        error = %error,
                        "rate limit store failed, admitting request"
                    );
                    limiter
                        .emit(AdmissionEvent::FailedOpen {
                            policy: policy.name().to_owned(),
                            key,
                            error: error.to_string(),
                        })
                        .await;
                    inner.call(req).await
                }
            }
        })
    }
}

fn insert_metadata(headers: &mut HeaderMap, result: &RateLimitResult) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(result.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(result.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(result.reset_at));
}

fn reject(result: &RateLimitResult, policy: &RateLimitPolicy) -> Response<String> {
    if let Some(builder) = policy.rejection() {
        return builder.build(result, policy);
    }

    let retry_after = result.retry_after_secs.unwrap_or(1);
    let body = serde_json::json!({
        "error": "Too Many Requests",
        "message": format!("Rate limit exceeded. Try again in {} seconds.", retry_after),
        "retryAfter": retry_after,
    });

    let mut response = Response::new(body.to_string());
    *response.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    if policy.include_headers() {
        insert_metadata(headers, result);
    }
    response
}
