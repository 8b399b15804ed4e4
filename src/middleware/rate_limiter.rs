//! Rate limiting middleware
//!
//! Fixed-window limits per client: an optional per-route window plus global
//! per-minute and per-hour windows, all evaluated for every request.
//! Fails open when the store is unreachable.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::{
    cache::{Admission, RateWindow},
    config::RateLimitSettings,
    error::AppError,
    middleware::AuthenticatedUser,
    AppState,
};

/// Paths never rate limited
const EXEMPT_PREFIXES: &[&str] = &["/health", "/docs", "/api-docs"];

/// Rate limit check result
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Maximum requests allowed in window
    pub limit: i64,
    /// Remaining requests in current window
    pub remaining: i64,
    /// Timestamp when the rate limit resets
    pub reset_at: i64,
    /// Current request count
    pub current: i64,
    /// Seconds until the window closes
    pub retry_after: u64,
}

impl RateLimitResult {
    /// Summarise an admission by its binding window
    pub fn from_admission(admission: &Admission, now: i64) -> Option<Self> {
        let (_, decision) = admission.binding()?;
        Some(Self {
            allowed: admission.allowed(),
            limit: saturating_i64(decision.limit),
            remaining: saturating_i64(decision.remaining()),
            reset_at: now.saturating_add(saturating_i64(decision.ttl_remaining)),
            current: decision.current,
            retry_after: decision.ttl_remaining.max(1),
        })
    }

    /// Create rate limit headers for the response
    pub fn headers(&self) -> Vec<(header::HeaderName, HeaderValue)> {
        let mut headers = vec![
            (
                header::HeaderName::from_static("x-ratelimit-limit"),
                HeaderValue::from(self.limit),
            ),
            (
                header::HeaderName::from_static("x-ratelimit-remaining"),
                HeaderValue::from(self.remaining.max(0)),
            ),
            (
                header::HeaderName::from_static("x-ratelimit-reset"),
                HeaderValue::from(self.reset_at),
            ),
        ];

        if !self.allowed {
            headers.push((header::RETRY_AFTER, HeaderValue::from(self.retry_after)));
        }

        headers
    }
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// True for paths outside rate limiting
pub fn is_exempt(path: &str) -> bool {
    path == "/"
        || path == "/metrics"
        || EXEMPT_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

/// Windows that apply to a request: the route override first, then the
/// global per-minute and per-hour windows
pub fn windows_for(settings: &RateLimitSettings, method: &Method, path: &str) -> Vec<RateWindow> {
    let mut windows = Vec::with_capacity(3);
    if let Some(route) = settings.routes.get(path) {
        windows.push(RateWindow::new(
            format!("{}:{}", method, path),
            route.requests,
            route.window_seconds,
        ));
    }
    windows.push(RateWindow::per_minute(settings.per_minute));
    windows.push(RateWindow::per_hour(settings.per_hour));
    windows
}

/// Identify the caller: authenticated user first, then client address
pub fn client_identifier(request: &Request) -> String {
    if let Some(user) = request.extensions().get::<AuthenticatedUser>() {
        return format!("user:{}", user.user_id);
    }

    let addr = forwarded_client_ip(request.headers()).or_else(|| {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
    });

    format!("ip:{}", addr.unwrap_or_else(|| "unknown".to_string()))
}

/// Client address reported by a reverse proxy
fn forwarded_client_ip(headers: &HeaderMap) -> Option<String> {
    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header_str("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return Some(first.to_string());
    }

    header_str("x-real-ip").map(str::to_string)
}

/// Build a 429 Too Many Requests response with rate limit headers
pub fn rate_limit_exceeded_response(result: &RateLimitResult) -> Response {
    let error = AppError::RateLimitExceeded {
        message: format!(
            "Rate limit exceeded: {}/{} requests. Try again in {} seconds.",
            result.current, result.limit, result.retry_after
        ),
        limit: result.limit,
        used: result.current,
        remaining: result.remaining.max(0),
        reset_at: Some(
            chrono::DateTime::from_timestamp(result.reset_at, 0)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| result.reset_at.to_string()),
        ),
    };

    let mut response = error.into_response();

    // Add rate limit headers
    let headers = response.headers_mut();
    for (name, value) in result.headers() {
        headers.insert(name, value);
    }

    response
}

/// Rate limiting middleware
///
/// Checks every applicable window before processing the request. Returns 429
/// if any is exceeded and adds rate limit headers to all other responses.
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let settings = &state.config.rate_limit;
    let path = request.uri().path().to_string();

    if !settings.enabled || is_exempt(&path) {
        return next.run(request).await;
    }

    let identifier = client_identifier(&request);
    let windows = windows_for(settings, request.method(), &path);
    let admission = state.rate_limiter.check_windows(&identifier, &windows).await;

    let Some(result) = RateLimitResult::from_admission(&admission, chrono::Utc::now().timestamp())
    else {
        return next.run(request).await;
    };

    if !result.allowed {
        warn!(
            identifier = %identifier,
            path = %path,
            limit = result.limit,
            current = result.current,
            "Rate limit exceeded"
        );
        return rate_limit_exceeded_response(&result);
    }

    let mut response = next.run(request).await;

    // Add rate limit headers to successful response
    let headers = response.headers_mut();
    for (name, value) in result.headers() {
        headers.insert(name, value);
    }

    response
}
