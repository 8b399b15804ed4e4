//! Session integration tests
//!
//! Sessions and the token blacklist share the application's store with the
//! cache and the rate limiter.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

use bazaar::cache::keys;

use crate::common::TestApp;

fn data(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = TestApp::new();
    let sessions = &app.state.sessions;

    let session_id = sessions
        .create_session("u42", data(json!({ "cart_id": "c-9" })), None)
        .await
        .expect("session created");

    let session = sessions.get_user_session("u42").await.unwrap();
    assert_eq!(session.session_id, session_id);
    assert_eq!(session.data["cart_id"], "c-9");

    assert!(
        sessions
            .update_session(&session_id, data(json!({ "currency": "EUR" })))
            .await
    );
    let session = sessions.get_session(&session_id).await.unwrap();
    assert_eq!(session.data["cart_id"], "c-9");
    assert_eq!(session.data["currency"], "EUR");

    assert!(sessions.delete_user_sessions("u42").await);
    assert!(sessions.get_session(&session_id).await.is_none());
    assert!(!app.state.cache.exists(&keys::user_session("u42")).await);
}

#[tokio::test]
async fn test_sessions_show_up_in_cache_stats() {
    let app = TestApp::new();
    app.state
        .sessions
        .create_session("u1", Map::new(), None)
        .await
        .unwrap();

    let body: Value = app.server.get("/admin/cache/stats").await.json();
    assert_eq!(body["families"]["sessions"], 1);
}

#[tokio::test]
async fn test_blacklisted_token_is_rejected_until_expiry() {
    let app = TestApp::new();
    let sessions = &app.state.sessions;
    let token = "eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiJ1NDIifQ.sig";

    assert!(!sessions.is_token_blacklisted(token).await);
    assert!(
        sessions
            .blacklist_token(token, Some(Duration::from_secs(60)))
            .await
    );
    assert!(sessions.is_token_blacklisted(token).await);

    let ttl = app
        .state
        .store
        .get_ttl(&keys::blacklist(&bazaar::cache::session::token_digest(token)))
        .await
        .unwrap();
    assert!((1..=60).contains(&ttl));
}

#[tokio::test]
async fn test_sessions_degrade_during_outage() {
    let app = TestApp::new();
    app.set_store_available(false);

    assert!(app
        .state
        .sessions
        .create_session("u7", Map::new(), None)
        .await
        .is_none());
    assert!(!app.state.sessions.is_token_blacklisted("any").await);
}
