//! Health endpoint integration tests
//!
//! Tests for the operational endpoints:
//! - GET /health - Full health check with store status
//! - GET /health/ready - Readiness check
//! - GET /health/live - Liveness check
//! - GET /admin/cache/stats - Store statistics
//! - GET /docs, /api-docs/openapi.json - API documentation

use pretty_assertions::assert_eq;
use serde_json::Value;

use crate::common::TestApp;

#[tokio::test]
async fn test_health_reports_store_status() {
    let app = TestApp::new();

    let response = app.server.get("/health").await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["cache_backend"], "memory");
    assert_eq!(body["checks"]["store"]["status"], "healthy");
    assert!(body["version"].is_string());
    assert!(body["uptime_seconds"].is_u64());
}

#[tokio::test]
async fn test_store_outage_degrades_but_keeps_serving() {
    let app = TestApp::new();
    app.set_store_available(false);

    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["store"]["status"], "unhealthy");
    assert_eq!(body["checks"]["store"]["error"], "Store unreachable");

    let ready: Value = app.server.get("/health/ready").await.json();
    assert_eq!(ready["status"], "degraded");

    // Catalog reads still succeed, straight from the repository
    app.server.get("/api/v1/products/p1").await.assert_status_ok();
}

#[tokio::test]
async fn test_liveness_check() {
    let app = TestApp::new();

    let response = app.server.get("/health/live").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_cache_stats_counts_key_families() {
    let app = TestApp::new();

    app.server.get("/api/v1/products/p1").await.assert_status_ok();
    app.server.get("/api/v1/products/p2").await.assert_status_ok();
    app.server.get("/api/v1/products").await.assert_status_ok();

    let response = app.server.get("/admin/cache/stats").await;
    response.assert_status_ok();

    let body: Value = response.json();
    // product:p1, product:p2, products:list:...
    assert_eq!(body["families"]["products"], 3);
    assert_eq!(body["families"]["sessions"], 0);
    assert!(body["families"]["rate_limits"].as_u64().unwrap() > 0);
    assert!(body["total_keys"].as_u64().unwrap() >= 3);
}

#[tokio::test]
async fn test_cache_stats_unavailable_when_store_down() {
    let app = TestApp::new();
    app.set_store_available(false);

    let response = app.server.get("/admin/cache/stats").await;
    response.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);

    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
}

#[tokio::test]
async fn test_openapi_document_lists_operational_routes() {
    let app = TestApp::new();

    let response = app.server.get("/api-docs/openapi.json").await;
    response.assert_status_ok();

    let document: Value = response.json();
    assert_eq!(document["info"]["title"], "Bazaar API");
    assert!(document["paths"]["/health"].is_object());
    assert!(document["paths"]["/admin/cache/stats"].is_object());
    assert!(document["paths"]["/admin/cache/{family}"]["delete"].is_object());

    let docs = app.server.get("/docs").await;
    docs.assert_status_ok();
    assert!(docs.text().contains("swagger-ui"));
}

#[tokio::test]
async fn test_metrics_endpoint_responds() {
    bazaar::routes::metrics::init_metrics();
    let app = TestApp::new();

    app.server.get("/metrics").await.assert_status_ok();
}
