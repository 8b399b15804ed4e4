//! Cache module
//!
//! Application-level caching on top of `KeyValueStore`: key naming, TTL
//! policy, read-through and invalidation wrappers, the fixed-window rate
//! limiter and session storage.

pub mod keys;
pub mod rate_limit;
pub mod read_through;
pub mod service;
pub mod session;

pub use self::rate_limit::{Admission, RateDecision, RateLimiter, RateWindow};
pub use self::read_through::{
    with_cache, with_invalidation, with_key_invalidation, CachedFn, InvalidatingFn,
    KeyInvalidatingFn,
};
pub use self::service::CacheService;
pub use self::session::SessionStore;

/// Metrics for the cache layer
pub mod metrics {
    use ::metrics::counter;

    /// Record a cache lookup or write (`operation` = get/set/invalidate)
    pub fn record_operation(operation: &'static str, result: &'static str) {
        counter!(
            "bazaar_cache_operations_total",
            "operation" => operation,
            "result" => result
        )
        .increment(1);
    }

    /// Record a rate-limit decision (`allowed`, `denied`, `fail_open`)
    pub fn record_rate_limit_decision(result: &'static str) {
        counter!("bazaar_rate_limit_decisions_total", "result" => result).increment(1);
    }
}
