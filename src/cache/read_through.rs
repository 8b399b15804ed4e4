//! Read-through and write-invalidation wrappers
//!
//! `with_cache` wraps a loader so repeated calls with the same key are served
//! from the cache; `with_invalidation` wraps a write so the given key families
//! are purged once it finishes. Keys come from a typed builder supplied by the
//! call site, so a key that does not fit the arguments fails to compile.
//!
//! Synchronous functions can be wrapped by returning an `async move` block.

use std::future::Future;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::metrics::record_operation;
use super::service::CacheService;

/// True for values not worth caching: `null`, `""`, `[]` and `{}`
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

impl CacheService {
    /// Serve `key` from the cache, or run `load` and cache a non-empty `Ok` result.
    ///
    /// Errors from `load` pass through uncached. A cached value that no longer
    /// decodes as `T` is treated as a miss and overwritten.
    #[instrument(skip(self, load))]
    pub async fn read_through<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        load: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get_json::<T>(key).await {
            debug!("Cache hit");
            return Ok(hit);
        }

        debug!("Cache miss, loading");
        let value = load().await?;

        match serde_json::to_value(&value) {
            Ok(encoded) if is_empty(&encoded) => {
                debug!("Skipping cache for empty result");
                record_operation("set", "skipped");
            }
            Ok(encoded) => {
                let ttl = ttl.unwrap_or(self.ttls().default);
                let stored = self
                    .store()
                    .set_raw(key, &encoded.to_string(), Some(ttl))
                    .await;
                record_operation("set", if stored { "ok" } else { "error" });
            }
            Err(e) => warn!(error = %e, "Result is not serializable, not caching"),
        }

        Ok(value)
    }

    /// Await `write`, then purge every key matching `globs`.
    ///
    /// Invalidation runs whatever the write returned, since a failed write may
    /// still have changed part of the data.
    #[instrument(skip(self, write))]
    pub async fn invalidate_after<F, Fut>(&self, globs: &[&str], write: F) -> Fut::Output
    where
        F: FnOnce() -> Fut,
        Fut: Future,
    {
        let output = write().await;
        self.invalidate_patterns(globs).await;
        output
    }
}

/// Loader wrapped with read-through caching; see [`with_cache`]
pub struct CachedFn<K, F> {
    cache: CacheService,
    key_fn: K,
    ttl: Option<Duration>,
    inner: F,
}

/// Wrap `inner` so each call is keyed by `key_fn(&args)` and served from the
/// cache when possible. `ttl` of `None` uses the default TTL.
pub fn with_cache<A, T, E, K, F, Fut>(
    cache: CacheService,
    key_fn: K,
    ttl: Option<Duration>,
    inner: F,
) -> CachedFn<K, F>
where
    K: Fn(&A) -> String,
    F: Fn(A) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    T: Serialize + DeserializeOwned,
{
    CachedFn {
        cache,
        key_fn,
        ttl,
        inner,
    }
}

impl<K, F> CachedFn<K, F> {
    pub async fn call<A, T, E, Fut>(&self, args: A) -> Result<T, E>
    where
        K: Fn(&A) -> String,
        F: Fn(A) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        T: Serialize + DeserializeOwned,
    {
        let key = (self.key_fn)(&args);
        self.cache
            .read_through(&key, self.ttl, || (self.inner)(args))
            .await
    }
}

/// Write wrapped with pattern invalidation; see [`with_invalidation`]
pub struct InvalidatingFn<F> {
    cache: CacheService,
    patterns: Vec<String>,
    inner: F,
}

/// Wrap `inner` so every call purges `patterns` after it completes
pub fn with_invalidation<A, F, Fut>(cache: CacheService, patterns: &[&str], inner: F) -> InvalidatingFn<F>
where
    F: Fn(A) -> Fut,
    Fut: Future,
{
    InvalidatingFn {
        cache,
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        inner,
    }
}

impl<F> InvalidatingFn<F> {
    pub async fn call<A, Fut>(&self, args: A) -> Fut::Output
    where
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        let globs: Vec<&str> = self.patterns.iter().map(String::as_str).collect();
        self.cache
            .invalidate_after(&globs, || (self.inner)(args))
            .await
    }
}

/// Write that drops the one key derived from its arguments; see
/// [`with_key_invalidation`]
pub struct KeyInvalidatingFn<K, F> {
    cache: CacheService,
    key_fn: K,
    inner: F,
}

/// Wrap `inner` so every call deletes `key_fn(&args)` after it completes.
///
/// For writes that touch a single entity, e.g. `product:{id}`, where purging
/// a whole family would be wasteful.
pub fn with_key_invalidation<A, K, F, Fut>(cache: CacheService, key_fn: K, inner: F) -> KeyInvalidatingFn<K, F>
where
    K: Fn(&A) -> String,
    F: Fn(A) -> Fut,
    Fut: Future,
{
    KeyInvalidatingFn {
        cache,
        key_fn,
        inner,
    }
}

impl<K, F> KeyInvalidatingFn<K, F> {
    pub async fn call<A, Fut>(&self, args: A) -> Fut::Output
    where
        K: Fn(&A) -> String,
        F: Fn(A) -> Fut,
        Fut: Future,
    {
        let key = (self.key_fn)(&args);
        let output = (self.inner)(args).await;
        let deleted = self.cache.delete(&key).await;
        debug!(key = %key, deleted, "Invalidated key after write");
        output
    }
}
