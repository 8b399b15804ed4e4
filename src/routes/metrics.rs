//! Prometheus metrics endpoint
//!
//! Exposes application metrics in Prometheus format for monitoring.

use axum::response::IntoResponse;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// Global Prometheus handle for metrics export
static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Initialize metrics (call once at startup)
///
/// Installing fails if another recorder is already global; the first handle
/// wins and later calls are no-ops.
pub fn init_metrics() {
    let installed = PROMETHEUS_HANDLE
        .get_or_try_init(|| PrometheusBuilder::new().install_recorder())
        .is_ok();

    if installed {
        register_metrics();
    } else {
        tracing::warn!("Prometheus recorder could not be installed");
    }
}

/// Register all custom metrics
fn register_metrics() {
    metrics::describe_counter!(
        "bazaar_cache_operations_total",
        "Cache lookups and writes by operation and result"
    );
    metrics::describe_counter!(
        "bazaar_rate_limit_decisions_total",
        "Rate-limit decisions by result"
    );
    metrics::describe_counter!(
        "bazaar_store_errors_total",
        "Store failures absorbed by operation"
    );
}

/// Prometheus metrics endpoint handler
///
/// Returns metrics in Prometheus text format for scraping.
pub async fn prometheus_metrics() -> impl IntoResponse {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}
