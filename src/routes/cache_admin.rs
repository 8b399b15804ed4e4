//! Cache administration endpoints
//!
//! `/admin/cache/stats` reports server statistics plus a key count per
//! family, gathered with SCAN so the store is never blocked. The clear
//! endpoints delete a whole family or an arbitrary glob the same way.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::{
    cache::keys::patterns,
    error::{AppError, AppResult, ErrorResponse},
    AppState,
};

/// Cache statistics response
#[derive(Debug, Serialize, ToSchema)]
pub struct CacheStatsResponse {
    pub total_keys: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    /// Percentage of lookups that hit
    pub hit_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
    /// Key count per family (products, users, sessions, ...)
    pub families: BTreeMap<String, u64>,
}

/// Cache statistics endpoint
#[utoipa::path(
    get,
    path = "/admin/cache/stats",
    tag = "Cache",
    responses(
        (status = 200, description = "Store statistics", body = CacheStatsResponse),
        (status = 503, description = "Store unreachable", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn cache_stats(State(state): State<Arc<AppState>>) -> AppResult<Json<CacheStatsResponse>> {
    let stats = state
        .store
        .stats()
        .await
        .ok_or_else(|| AppError::ServiceUnavailable("Cache store is unreachable".to_string()))?;

    let mut families = BTreeMap::new();
    for (family, pattern) in patterns::FAMILIES {
        let count = state.store.scan_iter(pattern).count().await;
        families.insert(family.to_string(), count as u64);
    }

    Ok(Json(CacheStatsResponse {
        total_keys: stats.total_keys,
        keyspace_hits: stats.keyspace_hits,
        keyspace_misses: stats.keyspace_misses,
        hit_rate: stats.hit_rate,
        memory_used: stats.memory_used,
        connected_clients: stats.connected_clients,
        families,
    }))
}

/// Cache clear response
#[derive(Debug, Serialize, ToSchema)]
pub struct CacheClearResponse {
    /// Family name or glob that was cleared
    pub target: String,
    /// Number of keys deleted
    pub deleted: u64,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ClearPatternQuery {
    /// Redis glob, e.g. `product:*`
    pub pattern: Option<String>,
}

/// Deletes report 0 on an outage, so check first and answer 503 instead
async fn ensure_store(state: &AppState) -> AppResult<()> {
    if state.store.is_connected().await {
        Ok(())
    } else {
        Err(AppError::ServiceUnavailable(
            "Cache store is unreachable".to_string(),
        ))
    }
}

/// Clear one key family
#[utoipa::path(
    delete,
    path = "/admin/cache/{family}",
    tag = "Cache",
    params(
        ("family" = String, Path, description = "products, users, sessions, rate_limits, quiz, orders or all")
    ),
    responses(
        (status = 200, description = "Family cleared", body = CacheClearResponse),
        (status = 404, description = "Unknown family", body = ErrorResponse),
        (status = 503, description = "Store unreachable", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn clear_family(
    State(state): State<Arc<AppState>>,
    Path(family): Path<String>,
) -> AppResult<Json<CacheClearResponse>> {
    let globs = patterns::clearable(&family)
        .ok_or_else(|| AppError::NotFound(format!("Unknown cache family '{}'", family)))?;
    ensure_store(&state).await?;

    let deleted = state.cache.delete_patterns(globs).await;
    info!(family = %family, deleted, "Cleared cache family");

    Ok(Json(CacheClearResponse {
        target: family,
        deleted,
    }))
}

/// Clear every key matching a glob
#[utoipa::path(
    delete,
    path = "/admin/cache",
    tag = "Cache",
    params(ClearPatternQuery),
    responses(
        (status = 200, description = "Matching keys cleared", body = CacheClearResponse),
        (status = 400, description = "Missing pattern", body = ErrorResponse),
        (status = 503, description = "Store unreachable", body = ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn clear_pattern(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ClearPatternQuery>,
) -> AppResult<Json<CacheClearResponse>> {
    let pattern = query
        .pattern
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Query parameter 'pattern' is required".to_string()))?;
    ensure_store(&state).await?;

    let deleted = state.cache.delete_patterns(&[pattern.as_str()]).await;
    info!(pattern = %pattern, deleted, "Cleared cache pattern");

    Ok(Json(CacheClearResponse {
        target: pattern,
        deleted,
    }))
}
