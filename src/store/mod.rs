//! Key-value store module
//!
//! `KeyValueStore` wraps a pluggable backend (pooled Redis in production, an
//! in-memory map for tests) and absorbs every backend failure: each operation
//! logs and degrades to an empty value so callers treat an unreachable store as
//! a cache miss rather than an error.

pub mod glob;
pub mod in_memory;
pub mod redis;

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RedisSettings;

pub use self::in_memory::InMemoryBackend;
pub use self::redis::RedisBackend;

/// Number of keys requested per SCAN page
pub const SCAN_BATCH_SIZE: usize = 100;

/// Failures raised by a store backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store unavailable")]
    Unavailable,

    #[error("Store operation timed out")]
    Timeout,

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Value at '{0}' is not an integer")]
    NotAnInteger(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Server-side statistics reported by a backend
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StoreStats {
    pub total_keys: u64,
    pub keyspace_hits: u64,
    pub keyspace_misses: u64,
    pub hit_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,
}

impl StoreStats {
    /// Hit rate as a percentage of all keyspace lookups
    pub fn hit_rate(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64 * 100.0
        }
    }
}

/// Primitive operations a remote key-value service must provide.
///
/// Backends report failures; `KeyValueStore` decides how to degrade.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Liveness check
    async fn ping(&self) -> StoreResult<()>;

    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Store `value`, replacing any previous value and TTL
    async fn set(&self, key: &str, value: &str, ttl_seconds: Option<u64>) -> StoreResult<()>;

    /// Delete keys, returning how many existed
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;

    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Atomically add `amount`; with a TTL, the expiry is applied only when the
    /// key has none (first increment of a window), in the same round trip.
    async fn increment(&self, key: &str, amount: i64, ttl_seconds: Option<u64>)
        -> StoreResult<i64>;

    async fn expire(&self, key: &str, seconds: u64) -> StoreResult<bool>;

    /// Remaining TTL in seconds: `-2` when absent, `-1` when no expiry is set
    async fn ttl(&self, key: &str) -> StoreResult<i64>;

    /// One SCAN page: `(next_cursor, keys)`; a next cursor of 0 ends iteration
    async fn scan(&self, cursor: u64, pattern: &str, count: usize)
        -> StoreResult<(u64, Vec<String>)>;

    async fn stats(&self) -> StoreResult<StoreStats>;

    /// Release pooled connections
    async fn close(&self);
}

/// Degrading façade over a `StoreBackend`.
///
/// One instance is built at startup and shared (behind `Arc`) by the cache
/// service, the rate limiter and the session store.
pub struct KeyValueStore {
    settings: Option<RedisSettings>,
    backend: RwLock<Option<Arc<dyn StoreBackend>>>,
}

impl KeyValueStore {
    /// Create a Redis-backed store; nothing is connected until `connect`
    pub fn new(settings: RedisSettings) -> Self {
        Self {
            settings: Some(settings),
            backend: RwLock::new(None),
        }
    }

    /// Create a store over an already-built backend
    pub fn with_backend(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            settings: None,
            backend: RwLock::new(Some(backend)),
        }
    }

    /// Create a store that behaves as permanently unreachable
    pub fn disconnected() -> Self {
        Self {
            settings: None,
            backend: RwLock::new(None),
        }
    }

    fn backend(&self) -> Option<Arc<dyn StoreBackend>> {
        self.backend
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn replace_backend(&self, backend: Option<Arc<dyn StoreBackend>>) -> Option<Arc<dyn StoreBackend>> {
        let mut guard = self.backend.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, backend)
    }

    /// Build the pool and ping it.
    ///
    /// Fails closed: on any error the backend is left unset and the
    /// application keeps running uncached.
    pub async fn connect(&self) -> bool {
        let Some(settings) = &self.settings else {
            // Pre-built backends are already connected
            return self.is_connected().await;
        };

        let backend = match RedisBackend::new(settings) {
            Ok(backend) => Arc::new(backend),
            Err(e) => {
                error!(error = %e, "Failed to configure Redis pool");
                self.replace_backend(None);
                return false;
            }
        };

        match backend.ping().await {
            Ok(()) => {
                info!(url = %settings.redacted_url(), "Connected to Redis");
                if let Some(previous) = self.replace_backend(Some(backend)) {
                    previous.close().await;
                }
                true
            }
            Err(e) => {
                error!(error = %e, url = %settings.redacted_url(), "Failed to connect to Redis");
                backend.close().await;
                self.replace_backend(None);
                false
            }
        }
    }

    /// Call `connect` until the ping succeeds, doubling the delay each attempt
    pub async fn connect_with_retry(&self, max_retries: u32, base_delay: Duration) -> bool {
        let mut delay = base_delay;

        for attempt in 1..=max_retries {
            if self.connect().await && self.is_connected().await {
                info!(attempt, "Store connected");
                return true;
            }

            warn!(attempt, max_retries, "Store connection attempt failed");
            if attempt < max_retries {
                debug!(delay_ms = delay.as_millis() as u64, "Retrying store connection");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }

        error!(max_retries, "Failed to connect to store, continuing without cache");
        self.replace_backend(None);
        false
    }

    /// Close the pool; later operations degrade as if unreachable
    pub async fn disconnect(&self) {
        if let Some(backend) = self.replace_backend(None) {
            backend.close().await;
            info!("Store connection closed");
        }
    }

    /// Liveness check; never fails
    pub async fn is_connected(&self) -> bool {
        match self.backend() {
            Some(backend) => backend.ping().await.is_ok(),
            None => false,
        }
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let backend = self.backend()?;
        match backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                log_failure("get", key, &e);
                None
            }
        }
    }

    /// Get and decode a JSON value; undecodable data is a miss
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value is not valid JSON");
                None
            }
        }
    }

    /// Store a value; strings are written verbatim, everything else as JSON
    pub async fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V, ttl: Option<Duration>) -> bool {
        let encoded = match serde_json::to_value(value) {
            Ok(Value::String(s)) => s,
            Ok(other) => other.to_string(),
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to serialize value for cache");
                return false;
            }
        };
        self.set_raw(key, &encoded, ttl).await
    }

    pub async fn set_raw(&self, key: &str, value: &str, ttl: Option<Duration>) -> bool {
        let Some(backend) = self.backend() else {
            return false;
        };
        match backend.set(key, value, ttl.map(ttl_seconds)).await {
            Ok(()) => true,
            Err(e) => {
                log_failure("set", key, &e);
                false
            }
        }
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.delete_many(&[key.to_string()]).await > 0
    }

    pub async fn delete_many(&self, keys: &[String]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        let Some(backend) = self.backend() else {
            return 0;
        };
        match backend.delete(keys).await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, count = keys.len(), "Store delete_many failed");
                record_store_error("delete_many");
                0
            }
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        let Some(backend) = self.backend() else {
            return false;
        };
        match backend.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                log_failure("exists", key, &e);
                false
            }
        }
    }

    /// Atomic add; `None` when the store is unreachable
    pub async fn increment(&self, key: &str, amount: i64, ttl: Option<Duration>) -> Option<i64> {
        let backend = self.backend()?;
        match backend.increment(key, amount, ttl.map(ttl_seconds)).await {
            Ok(value) => Some(value),
            Err(e) => {
                log_failure("increment", key, &e);
                None
            }
        }
    }

    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let Some(backend) = self.backend() else {
            return false;
        };
        match backend.expire(key, ttl_seconds(ttl)).await {
            Ok(applied) => applied,
            Err(e) => {
                log_failure("expire", key, &e);
                false
            }
        }
    }

    /// Remaining TTL in seconds, with the backend's `-1`/`-2` sentinels
    pub async fn get_ttl(&self, key: &str) -> Option<i64> {
        let backend = self.backend()?;
        match backend.ttl(key).await {
            Ok(ttl) => Some(ttl),
            Err(e) => {
                log_failure("ttl", key, &e);
                None
            }
        }
    }

    /// Lazily iterate keys matching `pattern` page by page.
    ///
    /// The stream ends early (after logging) if the store fails mid-scan.
    pub fn scan_iter<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, String> {
        let Some(backend) = self.backend() else {
            return Box::pin(stream::empty());
        };

        Box::pin(async_stream::stream! {
            let mut cursor = 0u64;
            loop {
                match backend.scan(cursor, pattern, SCAN_BATCH_SIZE).await {
                    Ok((next, keys)) => {
                        for key in keys {
                            yield key;
                        }
                        if next == 0 {
                            break;
                        }
                        cursor = next;
                    }
                    Err(e) => {
                        error!(pattern = %pattern, error = %e, "Store scan failed");
                        record_store_error("scan");
                        break;
                    }
                }
            }
        })
    }

    /// Delete every key matching `pattern`, one SCAN page at a time
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let Some(backend) = self.backend() else {
            return 0;
        };

        let mut cursor = 0u64;
        let mut deleted = 0u64;
        loop {
            let (next, keys) = match backend.scan(cursor, pattern, SCAN_BATCH_SIZE).await {
                Ok(page) => page,
                Err(e) => {
                    error!(pattern = %pattern, error = %e, "Store delete_pattern failed");
                    record_store_error("delete_pattern");
                    return deleted;
                }
            };

            if !keys.is_empty() {
                match backend.delete(&keys).await {
                    Ok(count) => deleted += count,
                    Err(e) => {
                        error!(pattern = %pattern, error = %e, "Store delete_pattern failed");
                        record_store_error("delete_pattern");
                        return deleted;
                    }
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(pattern = %pattern, deleted, "Deleted keys by pattern");
        deleted
    }

    pub async fn stats(&self) -> Option<StoreStats> {
        let backend = self.backend()?;
        match backend.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(error = %e, "Failed to read store statistics");
                record_store_error("stats");
                None
            }
        }
    }
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn log_failure(operation: &'static str, key: &str, e: &StoreError) {
    error!(operation, key = %key, error = %e, "Store operation failed");
    record_store_error(operation);
}

fn record_store_error(operation: &'static str) {
    metrics::counter!("bazaar_store_errors_total", "operation" => operation).increment(1);
}
