//! Cache administration integration tests
//!
//! - DELETE /admin/cache/{family} - Clear a key family
//! - DELETE /admin/cache?pattern=... - Clear keys matching a glob

use axum::http::StatusCode;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{Map, Value};

use crate::common::TestApp;

async fn count_keys(app: &TestApp, pattern: &str) -> usize {
    app.state.store.scan_iter(pattern).count().await
}

#[tokio::test]
async fn test_clear_products_family() {
    let app = TestApp::new();

    app.server.get("/api/v1/products/p1").await.assert_status_ok();
    app.server.get("/api/v1/products/p2").await.assert_status_ok();
    app.server.get("/api/v1/products").await.assert_status_ok();
    let reads = app.repository_reads();

    let response = app.server.delete("/admin/cache/products").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["target"], "products");
    assert_eq!(body["deleted"], 3);
    assert_eq!(count_keys(&app, "product*").await, 0);

    // The next read goes back to the repository
    app.server.get("/api/v1/products/p1").await.assert_status_ok();
    assert_eq!(app.repository_reads(), reads + 1);
}

#[tokio::test]
async fn test_clear_sessions_leaves_other_families() {
    let app = TestApp::new();

    let session_id = app
        .state
        .sessions
        .create_session("u5", Map::new(), None)
        .await
        .unwrap();
    app.server.get("/api/v1/products/p1").await.assert_status_ok();

    let body: Value = app.server.delete("/admin/cache/sessions").await.json();
    // session:{id} and user_session:u5
    assert_eq!(body["deleted"], 2);

    assert!(app.state.sessions.get_session(&session_id).await.is_none());
    assert_eq!(count_keys(&app, "product:*").await, 1);
}

#[tokio::test]
async fn test_clear_rate_limits_resets_counters() {
    let app = TestApp::new();

    app.server.get("/api/v1/products").await.assert_status_ok();
    assert!(count_keys(&app, "rate_limit:*").await > 0);

    let body: Value = app.server.delete("/admin/cache/rate_limits").await.json();
    assert!(body["deleted"].as_u64().unwrap() > 0);
    assert_eq!(count_keys(&app, "rate_limit:*").await, 0);
}

#[tokio::test]
async fn test_clear_orders_family() {
    let app = TestApp::new();
    app.state.cache.set("order:17", "pending", None).await;
    app.state.cache.set("orders:user:3", "[]", None).await;

    let body: Value = app.server.delete("/admin/cache/orders").await.json();
    assert_eq!(body["deleted"], 2);

    let stats: Value = app.server.get("/admin/cache/stats").await.json();
    assert_eq!(stats["families"]["orders"], 0);
}

#[tokio::test]
async fn test_clear_unknown_family_is_not_found() {
    let app = TestApp::new();

    let response = app.server.delete("/admin/cache/widgets").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_clear_by_pattern() {
    let app = TestApp::new();

    app.server.get("/api/v1/products/p1").await.assert_status_ok();
    app.server.get("/api/v1/products/p2").await.assert_status_ok();

    let response = app
        .server
        .delete("/admin/cache")
        .add_query_param("pattern", "product:p1")
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["target"], "product:p1");
    assert_eq!(body["deleted"], 1);
    assert_eq!(count_keys(&app, "product:*").await, 1);
}

#[tokio::test]
async fn test_clear_by_pattern_requires_pattern() {
    let app = TestApp::new();

    let missing = app.server.delete("/admin/cache").await;
    missing.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = missing.json();
    assert_eq!(body["error"]["code"], "BAD_REQUEST");

    app.server
        .delete("/admin/cache")
        .add_query_param("pattern", " ")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clear_unavailable_when_store_down() {
    let app = TestApp::new();
    app.set_store_available(false);

    let response = app.server.delete("/admin/cache/products").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}
