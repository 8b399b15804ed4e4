//! HTTP routes for Bazaar
//!
//! Operational endpoints (health, metrics, docs, cache admin) plus the
//! wiring that puts application routes behind rate limiting.

pub mod cache_admin;
pub mod docs;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{middleware::rate_limiter::rate_limit_middleware, AppState};

/// Create the application router with only the operational endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    create_router_with(state, Router::new())
}

/// Create the application router, mounting `api` behind rate limiting
///
/// The middleware sees every route but skips exempt paths itself, so health
/// checks, docs and metrics are never limited.
pub fn create_router_with(state: Arc<AppState>, api: Router<Arc<AppState>>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check))
        .route("/health/live", get(health::liveness_check))
        .route("/metrics", get(metrics::prometheus_metrics));

    let admin_routes = Router::new()
        .route("/admin/cache", delete(cache_admin::clear_pattern))
        .route("/admin/cache/stats", get(cache_admin::cache_stats))
        .route("/admin/cache/:family", delete(cache_admin::clear_family));

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
        .merge(docs::create_docs_router())
        .merge(api)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        // Global middleware (applied to all routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
