//! Rate limiting integration tests
//!
//! Tests for the rate limiting middleware:
//! - Route overrides combined with the global minute/hour windows
//! - Rate limit headers (X-RateLimit-Limit, X-RateLimit-Remaining, X-RateLimit-Reset)
//! - 429 Too Many Requests responses with Retry-After header
//! - Per-client isolation
//! - Fail-open behaviour when the store is unreachable

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{constants::*, test_config, TestApp};

fn forwarded_for(ip: &str) -> (HeaderName, HeaderValue) {
    (
        HeaderName::from_static("x-forwarded-for"),
        HeaderValue::from_str(ip).unwrap(),
    )
}

fn header_i64(response: &axum_test::TestResponse, name: &str) -> i64 {
    response
        .headers()
        .get(name)
        .unwrap_or_else(|| panic!("missing header {}", name))
        .to_str()
        .unwrap()
        .parse()
        .unwrap()
}

async fn login(app: &TestApp, ip: &str) -> axum_test::TestResponse {
    let (name, value) = forwarded_for(ip);
    app.server
        .post(LOGIN_PATH)
        .add_header(name, value)
        .json(&json!({ "email": "shopper@example.com", "password": "hunter2" }))
        .await
}

#[tokio::test]
async fn test_sixth_login_within_window_is_rejected() {
    let app = TestApp::new();

    for expected_remaining in (0..5).rev() {
        let response = login(&app, CLIENT_IP).await;
        response.assert_status_ok();
        assert_eq!(header_i64(&response, "x-ratelimit-limit"), 5);
        assert_eq!(
            header_i64(&response, "x-ratelimit-remaining"),
            expected_remaining
        );
    }

    let response = login(&app, CLIENT_IP).await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);

    let retry_after = header_i64(&response, header::RETRY_AFTER.as_str());
    assert!((1..=300).contains(&retry_after), "retry_after = {}", retry_after);
    assert_eq!(header_i64(&response, "x-ratelimit-limit"), 5);
    assert_eq!(header_i64(&response, "x-ratelimit-remaining"), 0);

    let reset = header_i64(&response, "x-ratelimit-reset");
    assert!(reset > chrono::Utc::now().timestamp());

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "RATE_LIMIT_EXCEEDED");
    assert_eq!(body["error"]["details"]["limit"], 5);
    assert_eq!(body["error"]["details"]["used"], 6);
}

#[tokio::test]
async fn test_clients_are_limited_independently() {
    let app = TestApp::new();

    for _ in 0..6 {
        login(&app, "198.51.100.1").await;
    }
    login(&app, "198.51.100.1")
        .await
        .assert_status(StatusCode::TOO_MANY_REQUESTS);

    let response = login(&app, "198.51.100.2").await;
    response.assert_status_ok();
    assert_eq!(header_i64(&response, "x-ratelimit-remaining"), 4);
}

#[tokio::test]
async fn test_global_minute_window_applies_without_route_override() {
    let mut config = test_config();
    config.rate_limit.per_minute = 3;
    let app = TestApp::with_config(config);

    for _ in 0..3 {
        let (name, value) = forwarded_for(CLIENT_IP);
        app.server
            .get("/api/v1/products/p1")
            .add_header(name, value)
            .await
            .assert_status_ok();
    }

    let (name, value) = forwarded_for(CLIENT_IP);
    let response = app.server.get("/api/v1/products/p1").add_header(name, value).await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(header_i64(&response, "x-ratelimit-limit"), 3);
}

#[tokio::test]
async fn test_window_counters_live_in_the_store() {
    let app = TestApp::new();

    login(&app, CLIENT_IP).await.assert_status_ok();

    let store = app.state.store.clone();
    let route_key = format!("rate_limit:ip:{}:POST:{}", CLIENT_IP, LOGIN_PATH);
    assert_eq!(store.get(&route_key).await, Some("1".to_string()));
    assert!(store
        .get(&format!("rate_limit:ip:{}:default_minute", CLIENT_IP))
        .await
        .is_some());
    assert!(store
        .get(&format!("rate_limit:ip:{}:default_hour", CLIENT_IP))
        .await
        .is_some());

    let ttl = store.get_ttl(&route_key).await.unwrap();
    assert!((1..=300).contains(&ttl));
}

#[tokio::test]
async fn test_health_and_docs_are_never_limited() {
    let mut config = test_config();
    config.rate_limit.per_minute = 1;
    let app = TestApp::with_config(config);

    for _ in 0..5 {
        let response = app.server.get("/health").await;
        response.assert_status_ok();
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }

    for _ in 0..3 {
        app.server.get("/api-docs/openapi.json").await.assert_status_ok();
    }
}

#[tokio::test]
async fn test_disabled_limiter_passes_everything() {
    let mut config = test_config();
    config.rate_limit.enabled = false;
    let app = TestApp::with_config(config);

    for _ in 0..10 {
        let response = login(&app, CLIENT_IP).await;
        response.assert_status_ok();
        assert!(response.headers().get("x-ratelimit-limit").is_none());
    }
}

#[tokio::test]
async fn test_store_outage_fails_open() {
    let app = TestApp::new();
    app.set_store_available(false);

    for _ in 0..10 {
        login(&app, CLIENT_IP).await.assert_status_ok();
    }

    // Counting resumes from scratch once the store is back
    app.set_store_available(true);
    let response = login(&app, CLIENT_IP).await;
    response.assert_status_ok();
    assert_eq!(header_i64(&response, "x-ratelimit-remaining"), 4);
}
