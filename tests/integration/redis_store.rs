//! Store tests against a real Redis
//!
//! Each test skips itself when no server answers at the default test URL.
//! Keys live under a per-test namespace and are removed afterwards.

use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::json;

use bazaar::cache::RateLimiter;
use crate::skip_if_no_redis;

#[tokio::test]
async fn test_set_get_and_json_round_trip() {
    let redis = skip_if_no_redis!();
    let store = redis.store().await;

    let plain = redis.key("plain");
    let doc = redis.key("doc");
    assert!(store.set(&plain, "hello", None).await);
    assert!(store.set(&doc, &json!({ "name": "Walnut Desk" }), None).await);

    assert_eq!(store.get(&plain).await, Some("hello".to_string()));
    let decoded: Option<serde_json::Value> = store.get_json(&doc).await;
    assert_eq!(decoded, Some(json!({ "name": "Walnut Desk" })));

    store.disconnect().await;
    redis.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_increment_sets_expiry_only_once() {
    let redis = skip_if_no_redis!();
    let store = redis.store().await;
    let key = redis.key("counter");

    assert_eq!(store.increment(&key, 1, Some(Duration::from_secs(60))).await, Some(1));
    let first_ttl = redis.ttl(&key).await.unwrap();
    assert!((1..=60).contains(&first_ttl));

    // A longer TTL on a later increment must not extend the window
    assert_eq!(store.increment(&key, 1, Some(Duration::from_secs(600))).await, Some(2));
    assert!(redis.ttl(&key).await.unwrap() <= 60);

    // A counter that lost its expiry gets one back
    redis.persist(&key).await.unwrap();
    assert_eq!(redis.ttl(&key).await.unwrap(), -1);
    store.increment(&key, 1, Some(Duration::from_secs(30))).await;
    let repaired = redis.ttl(&key).await.unwrap();
    assert!((1..=30).contains(&repaired));

    store.disconnect().await;
    redis.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_delete_pattern_removes_only_matches() {
    let redis = skip_if_no_redis!();
    let store = redis.store().await;

    for i in 0..120 {
        store.set(&redis.key(&format!("products:list:{i}")), "x", None).await;
    }
    let keep = redis.key("product:1");
    store.set(&keep, "keep", None).await;

    let pattern = format!("{}:products:*", redis.namespace());
    assert_eq!(store.scan_iter(&pattern).count().await, 120);
    assert_eq!(store.delete_pattern(&pattern).await, 120);
    assert!(store.exists(&keep).await);

    store.disconnect().await;
    redis.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_rate_limiter_on_redis() {
    let redis = skip_if_no_redis!();
    let store = redis.store().await;
    let limiter = RateLimiter::new(store.clone());
    let identifier = format!("{}:ip:192.0.2.1", redis.namespace());

    let mut decisions = Vec::new();
    for _ in 0..6 {
        let decision = limiter
            .check_rate_limit(&identifier, 5, 300, "login")
            .await;
        decisions.push((decision.allowed, decision.current));
    }

    assert_eq!(
        decisions,
        vec![(true, 1), (true, 2), (true, 3), (true, 4), (true, 5), (false, 6)]
    );

    store
        .delete_pattern(&format!("rate_limit:{}*", redis.namespace()))
        .await;
    store.disconnect().await;
    redis.cleanup().await.unwrap();
}

#[tokio::test]
async fn test_stats_report_keyspace() {
    let redis = skip_if_no_redis!();
    let store = redis.store().await;

    let stats = store.stats().await.expect("stats from live server");
    assert!((0.0..=100.0).contains(&stats.hit_rate));

    store.disconnect().await;
}
