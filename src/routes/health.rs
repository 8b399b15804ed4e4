//! Health check endpoints
//!
//! Provides endpoints for monitoring and container orchestration:
//! - `/health` - Full health check with dependency status
//! - `/health/ready` - Readiness check
//! - `/health/live` - Liveness check
//!
//! An unreachable store only degrades the service: requests are still served,
//! uncached and without rate limiting.

use std::sync::Arc;
use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::config::CacheBackend;
use crate::AppState;

/// Health status enum
#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual dependency check result
#[derive(Debug, Serialize, ToSchema)]
pub struct DependencyCheck {
    pub status: HealthStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Dependency checks collection
#[derive(Debug, Serialize, ToSchema)]
pub struct DependencyChecks {
    pub store: DependencyCheck,
}

/// Full health check response
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: String,
    /// `redis` or `memory`
    pub cache_backend: String,
    pub checks: DependencyChecks,
}

/// Simple health response for liveness/readiness
#[derive(Debug, Serialize, ToSchema)]
pub struct SimpleHealthResponse {
    pub status: HealthStatus,
}

/// Check store connectivity
async fn check_store(state: &AppState) -> DependencyCheck {
    let start = Instant::now();
    let connected = state.store.is_connected().await;
    let latency_ms = start.elapsed().as_millis() as u64;

    if connected {
        DependencyCheck {
            status: HealthStatus::Healthy,
            latency_ms,
            error: None,
        }
    } else {
        DependencyCheck {
            status: HealthStatus::Unhealthy,
            latency_ms,
            error: Some("Store unreachable".to_string()),
        }
    }
}

/// Full health check endpoint
///
/// Returns overall status, version, uptime and the store check. A store
/// outage reports `degraded` with 200.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is up (possibly degraded)", body = HealthResponse)
    )
)]
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let store_check = check_store(&state).await;

    let overall_status = if store_check.status == HealthStatus::Healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    let backend = match state.config.cache_backend {
        CacheBackend::Redis => "redis",
        CacheBackend::Memory => "memory",
    };

    let response = HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        cache_backend: backend.to_string(),
        checks: DependencyChecks { store: store_check },
    };

    (StatusCode::OK, Json(response))
}

/// Readiness check endpoint
///
/// Ready whenever the process can serve; a store outage reports `degraded`.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Ready to receive traffic", body = SimpleHealthResponse)
    )
)]
pub async fn readiness_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<SimpleHealthResponse>) {
    let status = if state.store.is_connected().await {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    (StatusCode::OK, Json(SimpleHealthResponse { status }))
}

/// Liveness check endpoint
///
/// Returns 200 OK if the application is alive.
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Process is alive", body = SimpleHealthResponse)
    )
)]
pub async fn liveness_check() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: HealthStatus::Healthy,
        }),
    )
}
