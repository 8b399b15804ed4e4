//! Fixed-window rate limiting
//!
//! One counter per `(identifier, action)` at `rate_limit:{identifier}:{action}`.
//! The first increment of a window sets its expiry in the same atomic round
//! trip; later increments never touch it, so a window always closes
//! `window_seconds` after its first request.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use super::keys;
use super::metrics::record_rate_limit_decision;
use crate::store::KeyValueStore;

/// Outcome of one window check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    /// Whether the request fits in the window
    pub allowed: bool,
    /// Count after this request; 0 when the store was unreachable
    pub current: i64,
    /// Seconds until the window closes
    pub ttl_remaining: u64,
    /// Configured maximum for the window
    pub limit: u64,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl RateDecision {
    /// Requests left in the window
    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.current.max(0) as u64)
    }

    fn fail_open(limit: u64, window_seconds: u64) -> Self {
        Self {
            allowed: true,
            current: 0,
            ttl_remaining: window_seconds,
            limit,
            window_seconds,
        }
    }
}

/// A named window evaluated as part of one admission decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateWindow {
    pub action: String,
    pub limit: u64,
    pub window_seconds: u64,
}

impl RateWindow {
    pub fn new(action: impl Into<String>, limit: u64, window_seconds: u64) -> Self {
        Self {
            action: action.into(),
            limit,
            window_seconds,
        }
    }

    /// Global per-minute window
    pub fn per_minute(limit: u64) -> Self {
        Self::new("default_minute", limit, 60)
    }

    /// Global per-hour window
    pub fn per_hour(limit: u64) -> Self {
        Self::new("default_hour", limit, 3600)
    }
}

/// Combined result of several windows for one request
#[derive(Debug, Clone, Default)]
pub struct Admission {
    pub checks: Vec<(RateWindow, RateDecision)>,
}

impl Admission {
    /// Admitted only if every window allows it
    pub fn allowed(&self) -> bool {
        self.checks.iter().all(|(_, decision)| decision.allowed)
    }

    /// The window to report.
    ///
    /// When denied, the violated window that stays closed longest; otherwise
    /// the window with the fewest requests left.
    pub fn binding(&self) -> Option<&(RateWindow, RateDecision)> {
        let violated = self
            .checks
            .iter()
            .filter(|(_, decision)| !decision.allowed)
            .max_by_key(|(_, decision)| decision.ttl_remaining);

        violated.or_else(|| {
            self.checks
                .iter()
                .min_by_key(|(_, decision)| decision.remaining())
        })
    }

    /// Seconds the caller should wait, when denied
    pub fn retry_after(&self) -> Option<u64> {
        if self.allowed() {
            return None;
        }
        self.binding().map(|(_, decision)| decision.ttl_remaining.max(1))
    }
}

/// Fixed-window rate limiter over the shared store
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<KeyValueStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<KeyValueStore>) -> Self {
        Self { store }
    }

    /// Count one request for `identifier` performing `action`.
    ///
    /// Fails open: an unreachable store always allows.
    #[instrument(skip(self))]
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        limit: u64,
        window_seconds: u64,
        action: &str,
    ) -> RateDecision {
        let key = keys::rate_limit_window(identifier, action);
        let window = window_seconds.max(1);

        let Some(current) = self
            .store
            .increment(&key, 1, Some(Duration::from_secs(window)))
            .await
        else {
            debug!("Store unavailable, allowing request");
            record_rate_limit_decision("fail_open");
            return RateDecision::fail_open(limit, window);
        };

        let allowed = current <= i64::try_from(limit).unwrap_or(i64::MAX);

        let ttl_remaining = match self.store.get_ttl(&key).await {
            Some(ttl) if ttl >= 0 => ttl as u64,
            _ => window,
        };

        if allowed {
            record_rate_limit_decision("allowed");
        } else {
            warn!(current, limit, ttl_remaining, "Rate limit exceeded");
            record_rate_limit_decision("denied");
        }

        RateDecision {
            allowed,
            current,
            ttl_remaining,
            limit,
            window_seconds: window,
        }
    }

    /// Evaluate every window for one request
    pub async fn check_windows(&self, identifier: &str, windows: &[RateWindow]) -> Admission {
        let mut checks = Vec::with_capacity(windows.len());
        for window in windows {
            let decision = self
                .check_rate_limit(identifier, window.limit, window.window_seconds, &window.action)
                .await;
            checks.push((window.clone(), decision));
        }
        Admission { checks }
    }
}
