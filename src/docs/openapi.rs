//! OpenAPI document
//!
//! Aggregates the operational endpoints and their schemas into one document.

use utoipa::OpenApi;

use crate::error::{ErrorBody, ErrorDetails, ErrorResponse};
use crate::routes::{
    cache_admin::{CacheClearResponse, CacheStatsResponse},
    health::{
        DependencyCheck, DependencyChecks, HealthResponse, HealthStatus, SimpleHealthResponse,
    },
};

/// OpenAPI document for the Bazaar service
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bazaar API",
        version = "1.0.0",
        description = "Operational endpoints for the Bazaar cache and rate-limiting tier"
    ),
    paths(
        crate::routes::health::health_check,
        crate::routes::health::readiness_check,
        crate::routes::health::liveness_check,
        crate::routes::cache_admin::cache_stats,
        crate::routes::cache_admin::clear_family,
        crate::routes::cache_admin::clear_pattern
    ),
    components(
        schemas(
            // Health
            HealthStatus,
            DependencyCheck,
            DependencyChecks,
            HealthResponse,
            SimpleHealthResponse,
            // Cache
            CacheStatsResponse,
            CacheClearResponse,
            // Error
            ErrorResponse,
            ErrorBody,
            ErrorDetails,
        )
    ),
    tags(
        (name = "Health", description = "Liveness and dependency checks"),
        (name = "Cache", description = "Cache administration")
    )
)]
pub struct ApiDoc;
