mod common;

use common::{anonymous, as_user, counting_handler};
use http::header::RETRY_AFTER;
use http::StatusCode;
use ratewarden::prelude::*;
use ratewarden::presets;
use std::time::Duration;
use tower::ServiceExt;

#[tokio::test]
async fn strict_auth_blocks_sixth_login_for_fifteen_minutes() {
    let clock = ManualClock::new(0);
    let limiter = RateLimiter::new(presets::strict_auth()).with_clock(clock.clone());
    let (handler, _) = counting_handler();
    let svc = RateLimitLayer::new(limiter).layer(handler);

    for _ in 0..5 {
        let res = svc.clone().oneshot(anonymous("/login", "203.0.113.9")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }
    let res = svc.clone().oneshot(anonymous("/login", "203.0.113.9")).await.unwrap();
    assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(res.headers()[RETRY_AFTER], "900");

    // Signing in as someone else from the same address does not help.
    let res = svc.clone().oneshot(as_user("/login", "mallory")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK, "no forwarded-for header, so a different address");

    clock.advance(Duration::from_secs(15 * 60));
    let res = svc.clone().oneshot(anonymous("/login", "203.0.113.9")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn ai_analysis_allows_a_burst_of_three_then_refills_slowly() {
    let clock = ManualClock::new(0);
    let limiter = RateLimiter::new(presets::ai_analysis()).with_clock(clock.clone());
    let (handler, _) = counting_handler();
    let svc = RateLimitLayer::new(limiter).layer(handler);
    let analyze = || svc.clone().oneshot(as_user("/api/analyze", "writer"));

    for remaining in ["2", "1", "0"] {
        let res = analyze().await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()["x-ratelimit-limit"], "3");
        assert_eq!(res.headers()["x-ratelimit-remaining"], remaining);
    }
    let denied = analyze().await.unwrap();
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denied.headers()[RETRY_AFTER], "6");

    clock.advance(Duration::from_secs(6));
    assert_eq!(analyze().await.unwrap().status(), StatusCode::OK);
    assert_eq!(analyze().await.unwrap().status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn ai_analysis_admits_again_exactly_when_a_token_refills() {
    let clock = ManualClock::new(0);
    let limiter = RateLimiter::new(presets::ai_analysis()).with_clock(clock.clone());
    let key = RateLimitKey::from("user:writer:/api/analyze");

    for _ in 0..3 {
        assert!(limiter.check(&key).await.unwrap().admitted);
    }
    assert_eq!(limiter.check(&key).await.unwrap().retry_after_secs, Some(6));

    for expected in [5, 4, 3, 2, 1] {
        clock.advance(Duration::from_secs(1));
        let r = limiter.check(&key).await.unwrap();
        assert!(!r.admitted);
        assert_eq!(r.retry_after_secs, Some(expected));
    }
    clock.advance(Duration::from_secs(1));
    assert!(limiter.check(&key).await.unwrap().admitted);
    assert!(!limiter.check(&key).await.unwrap().admitted);
}

#[tokio::test]
async fn default_api_never_counts_health_checks() {
    let limiter = RateLimiter::new(presets::default_api());
    let (handler, calls) = counting_handler();
    let svc = RateLimitLayer::new(limiter.clone()).layer(handler);

    for _ in 0..250 {
        svc.clone().oneshot(anonymous("/healthz", "10.0.0.1")).await.unwrap();
    }
    assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 250);
    assert_eq!(limiter.store().len().await.unwrap(), 0);
}

#[tokio::test]
async fn public_read_is_shared_per_address() {
    let limiter = RateLimiter::new(presets::public_read());
    let (handler, _) = counting_handler();
    let svc = RateLimitLayer::new(limiter).layer(handler);
    let res = svc.oneshot(anonymous("/articles", "192.0.2.44, 10.0.0.1")).await.unwrap();
    assert_eq!(res.headers()["x-ratelimit-limit"], "1000");
    assert_eq!(res.headers()["x-ratelimit-remaining"], "999");
}

#[tokio::test]
async fn configured_policy_drives_middleware() {
    let cfg: PolicyConfig = serde_json::from_str(
        r#"{"preset":"strict-auth","name":"password_reset","max_requests":2,"key":"endpoint"}"#,
    )
    .unwrap();
    let policy = cfg.into_policy().unwrap();
    assert_eq!(policy.name(), "password_reset");

    let (handler, _) = counting_handler();
    let svc = wrap(handler, policy);
    assert_eq!(svc.clone().oneshot(anonymous("/reset", "1.1.1.1")).await.unwrap().status(), 200);
    assert_eq!(svc.clone().oneshot(anonymous("/reset", "2.2.2.2")).await.unwrap().status(), 200);
    let res = svc.clone().oneshot(anonymous("/reset", "3.3.3.3")).await.unwrap();
    assert_eq!(res.status(), 429);
    assert_eq!(res.headers()[RETRY_AFTER], "900");
}

#[test]
fn every_preset_is_reachable_by_name() {
    for preset in Preset::ALL {
        let by_name: Preset = preset.to_string().parse().unwrap();
        assert_eq!(by_name.policy().name(), preset.policy().name());
    }
}
