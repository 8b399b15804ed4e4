//! Caching integration tests
//!
//! Exercises read-through caching and write invalidation end to end:
//! - Catalog routes served through `CachedProductRepository`
//! - Writes purging item and list families
//! - TTL expiry on a paused clock
//! - Pass-through behaviour while the store is unreachable

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use bazaar::cache::{keys, with_cache, with_invalidation, CacheService};
use bazaar::catalog::{
    CachedProductRepository, InMemoryProductRepository, ProductFilter, ProductRepository,
};
use bazaar::config::CacheTtls;

use crate::common::{constants::*, sample_products, TestApp};

#[tokio::test]
async fn test_repeated_product_reads_hit_repository_once() {
    let app = TestApp::new();

    let first: Value = app.server.get("/api/v1/products/p1").await.json();
    let second: Value = app.server.get("/api/v1/products/p1").await.json();

    assert_eq!(first, second);
    assert_eq!(first["name"], "Walnut Desk");
    assert_eq!(app.repository_reads(), 1);
    assert!(app.state.cache.exists(&keys::product("p1")).await);
}

#[tokio::test]
async fn test_list_queries_are_cached_per_filter() {
    let app = TestApp::new();

    let furniture: Value = app
        .server
        .get(PRODUCTS_PATH)
        .add_query_param("category", "furniture")
        .await
        .json();
    app.server
        .get(PRODUCTS_PATH)
        .add_query_param("category", "furniture")
        .await
        .assert_status_ok();
    let lighting: Value = app
        .server
        .get(PRODUCTS_PATH)
        .add_query_param("category", "lighting")
        .await
        .json();

    assert_eq!(furniture.as_array().unwrap().len(), 2);
    assert_eq!(lighting.as_array().unwrap().len(), 1);
    assert_eq!(app.repository_reads(), 2);
}

#[tokio::test]
async fn test_create_invalidates_cached_lists() {
    let app = TestApp::new();

    let before: Value = app.server.get(PRODUCTS_PATH).await.json();
    assert_eq!(before.as_array().unwrap().len(), 3);
    app.server.get("/api/v1/products/p1").await.assert_status_ok();

    app.server
        .post(PRODUCTS_PATH)
        .json(&json!({
            "id": "p4",
            "name": "Bookshelf",
            "category": "furniture",
            "price_cents": 20_000,
            "in_stock": true
        }))
        .await
        .assert_status(axum::http::StatusCode::CREATED);

    assert!(!app.state.cache.exists(&keys::product("p1")).await);

    let after: Value = app.server.get(PRODUCTS_PATH).await.json();
    assert_eq!(after.as_array().unwrap().len(), 4);
    assert_eq!(app.repository_reads(), 3);
}

#[tokio::test]
async fn test_missing_product_is_not_cached() {
    let app = TestApp::new();

    app.server
        .get("/api/v1/products/nope")
        .await
        .assert_status(axum::http::StatusCode::NOT_FOUND);
    app.server
        .get("/api/v1/products/nope")
        .await
        .assert_status(axum::http::StatusCode::NOT_FOUND);

    assert_eq!(app.repository_reads(), 2);
}

#[tokio::test]
async fn test_store_outage_is_pure_passthrough() {
    let app = TestApp::new();
    app.set_store_available(false);

    for _ in 0..3 {
        let body: Value = app.server.get("/api/v1/products/p2").await.json();
        assert_eq!(body["name"], "Desk Lamp");
    }
    assert_eq!(app.repository_reads(), 3);

    // Recovery resumes caching
    app.set_store_available(true);
    app.server.get("/api/v1/products/p2").await.assert_status_ok();
    app.server.get("/api/v1/products/p2").await.assert_status_ok();
    assert_eq!(app.repository_reads(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_lists_expire_before_items() {
    let (_backend, cache) = CacheService::in_memory(CacheTtls::default());
    let catalog = CachedProductRepository::new(
        InMemoryProductRepository::with_products(sample_products()),
        cache,
    );

    tokio_test::assert_ok!(catalog.get("p1").await);
    tokio_test::assert_ok!(catalog.list(&ProductFilter::default()).await);
    assert_eq!(catalog.inner().reads(), 2);

    // Past the list TTL (120 s) but inside the entity TTL (600 s)
    tokio::time::advance(Duration::from_secs(121)).await;
    tokio_test::assert_ok!(catalog.get("p1").await);
    tokio_test::assert_ok!(catalog.list(&ProductFilter::default()).await);
    assert_eq!(catalog.inner().reads(), 3);

    tokio::time::advance(Duration::from_secs(600)).await;
    tokio_test::assert_ok!(catalog.get("p1").await);
    assert_eq!(catalog.inner().reads(), 4);
}

#[tokio::test]
async fn test_wrapped_functions_share_the_key_namespace() {
    let (_backend, cache) = CacheService::in_memory(CacheTtls::default());
    let loads = Arc::new(AtomicUsize::new(0));

    let topic_questions = {
        let loads = loads.clone();
        with_cache(
            cache.clone(),
            |topic: &String| keys::quiz_topic(topic),
            Some(Duration::from_secs(60)),
            move |topic: String| {
                let loads = loads.clone();
                async move {
                    loads.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(vec![format!("{topic}-q1"), format!("{topic}-q2")])
                }
            },
        )
    };

    let add_question = with_invalidation(
        cache.clone(),
        keys::patterns::QUIZ_WRITE,
        |question: String| async move { Ok::<_, String>(question) },
    );

    let first = tokio_test::assert_ok!(topic_questions.call("rust".to_string()).await);
    let second = tokio_test::assert_ok!(topic_questions.call("rust".to_string()).await);
    assert_eq!(first, second);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    tokio_test::assert_ok!(add_question.call("rust-q3".to_string()).await);
    assert!(!cache.exists(&keys::quiz_topic("rust")).await);

    tokio_test::assert_ok!(topic_questions.call("rust".to_string()).await);
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}
