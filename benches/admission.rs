use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::Ready;
use http::{Request, Response};
use ratewarden::rate_limit::{RateLimitLayer, RateLimitPolicy, RateLimiter, StrategyKind};
use ratewarden::RateLimitKey;
use std::convert::Infallible;
use std::time::Duration;
use tower::{Service, ServiceBuilder};

// Answers every request immediately so only the middleware is measured.
#[derive(Clone)]
struct EchoService;

impl Service<Request<String>> for EchoService {
    type Response = Response<String>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<String>) -> Self::Future {
        futures::future::ready(Ok(Response::new(req.into_body())))
    }
}

fn policy(kind: StrategyKind) -> RateLimitPolicy {
    // High ceiling so the hot key stays admitted for the whole run.
    RateLimitPolicy::builder(kind.to_string())
        .strategy(kind)
        .max_requests(u32::MAX)
        .window(Duration::from_secs(1))
        .build()
        .unwrap()
}

fn hot_key_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    // Sliding window keeps a timestamp per request, so it is bounded separately.
    for kind in [StrategyKind::FixedWindow, StrategyKind::TokenBucket] {
        let limiter = RateLimiter::new(policy(kind));
        let key = RateLimitKey::from("user:bench:/api");
        c.bench_function(&format!("check_hot_key_{}", kind), |b| {
            b.to_async(&rt).iter(|| async {
                black_box(limiter.check(black_box(&key)).await.unwrap());
            });
        });
    }

    let sliding = RateLimitPolicy::builder("sliding")
        .sliding_window(1_000, Duration::from_millis(50))
        .build()
        .unwrap();
    let limiter = RateLimiter::new(sliding);
    let key = RateLimitKey::from("user:bench:/api");
    c.bench_function("check_hot_key_sliding_window", |b| {
        b.to_async(&rt).iter(|| async {
            black_box(limiter.check(black_box(&key)).await.unwrap());
        });
    });
}

fn many_keys_check(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let limiter = RateLimiter::new(policy(StrategyKind::FixedWindow));
    let keys: Vec<RateLimitKey> =
        (0..10_000).map(|i| RateLimitKey::new(format!("user:{}:/api", i))).collect();
    let mut next = 0usize;

    c.bench_function("check_10k_keys_round_robin", |b| {
        b.to_async(&rt).iter(|| {
            next = (next + 1) % keys.len();
            let key = &keys[next];
            let limiter = &limiter;
            async move {
                black_box(limiter.check(key).await.unwrap());
            }
        });
    });
}

fn middleware_round_trip(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let layer = RateLimitLayer::from_policy(policy(StrategyKind::TokenBucket));
    let svc = ServiceBuilder::new().layer(layer).service(EchoService);

    c.bench_function("middleware_admitted_request", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let req = Request::builder().uri("/api").body(String::new()).unwrap();
            let _ = black_box(local_svc.call(black_box(req)).await);
        });
    });
}

criterion_group!(benches, hot_key_check, many_keys_check, middleware_round_trip);
criterion_main!(benches);
