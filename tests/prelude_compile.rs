//! Compile-time prelude coverage test.
use ratewarden::prelude::*;
use std::time::Duration;
use tower::service_fn;
use tower_service::Service;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let policy = RateLimitPolicy::builder("prelude")
        .fixed_window(1, Duration::from_secs(1))
        .key_generator(EndpointKey)
        .build()
        .expect("valid policy");
    let limiter = RateLimiter::new(policy).with_store(InMemoryStore::new()).with_sink(NullSink);
    let layer = RateLimitLayer::new(limiter);

    let mut svc = layer.layer(service_fn(|_req: http::Request<String>| async {
        Ok::<_, std::io::Error>(http::Response::new(String::new()))
    }));
    let req = http::Request::builder().uri("/").body(String::new()).unwrap();
    let res = svc.call(req).await.expect("service call failed");
    assert_eq!(res.status(), 200);
    let _ = Preset::ALL.map(Preset::policy);
}
