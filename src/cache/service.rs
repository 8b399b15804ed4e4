//! Cache service
//!
//! Single façade every call site goes through. Owns the key conventions and
//! the TTL policy per entity class; never surfaces store failures.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::keys::{self, patterns};
use super::metrics::record_operation;
use crate::config::CacheTtls;
use crate::store::{InMemoryBackend, KeyValueStore, SCAN_BATCH_SIZE};

/// Application-wide cache façade
#[derive(Clone)]
pub struct CacheService {
    store: Arc<KeyValueStore>,
    ttls: CacheTtls,
}

impl CacheService {
    /// Create a cache service over a shared store
    pub fn new(store: Arc<KeyValueStore>, ttls: CacheTtls) -> Self {
        Self { store, ttls }
    }

    /// Cache service over a fresh in-process store
    pub fn in_memory(ttls: CacheTtls) -> (Arc<InMemoryBackend>, Self) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = Arc::new(KeyValueStore::with_backend(backend.clone()));
        (backend, Self::new(store, ttls))
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<KeyValueStore> {
        &self.store
    }

    /// TTL policy
    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Get a value, decoding JSON when possible and falling back to the raw string
    pub async fn get(&self, key: &str) -> Option<Value> {
        let Some(raw) = self.store.get(key).await else {
            record_operation("get", "miss");
            return None;
        };
        record_operation("get", "hit");
        Some(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
    }

    /// Get and decode a typed value; undecodable data counts as a miss
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.store.get_json(key).await;
        record_operation("get", if value.is_some() { "hit" } else { "miss" });
        value
    }

    /// Store a value; `None` applies the default TTL
    pub async fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V, ttl: Option<Duration>) -> bool {
        let stored = self
            .store
            .set(key, value, Some(ttl.unwrap_or(self.ttls.default)))
            .await;
        record_operation("set", if stored { "ok" } else { "error" });
        stored
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.store.delete(key).await
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.store.exists(key).await
    }

    /// Delete every key matching any of `globs`, batch by batch
    #[instrument(skip(self))]
    pub async fn delete_patterns(&self, globs: &[&str]) -> u64 {
        let mut total = 0;
        for pattern in globs {
            let mut batches = self.store.scan_iter(pattern).chunks(SCAN_BATCH_SIZE);
            while let Some(batch) = batches.next().await {
                total += self.store.delete_many(&batch).await;
            }
        }
        debug!(deleted = total, "Invalidated cache patterns");
        record_operation("invalidate", "ok");
        total
    }

    /// Alias of `delete_patterns` used by write paths
    pub async fn invalidate_patterns(&self, globs: &[&str]) -> u64 {
        self.delete_patterns(globs).await
    }

    // Products

    pub async fn get_product<T: DeserializeOwned>(&self, product_id: &str) -> Option<T> {
        self.get_json(&keys::product(product_id)).await
    }

    pub async fn set_product<T: Serialize + ?Sized>(&self, product_id: &str, product: &T) -> bool {
        self.set(&keys::product(product_id), product, Some(self.ttls.entity))
            .await
    }

    pub async fn invalidate_product(&self, product_id: &str) -> bool {
        self.delete(&keys::product(product_id)).await
    }

    pub async fn get_products_list<T: DeserializeOwned>(&self, qualifier: &str) -> Option<T> {
        self.get_json(&keys::products_list(qualifier)).await
    }

    pub async fn set_products_list<T: Serialize + ?Sized>(&self, qualifier: &str, products: &T) -> bool {
        self.set(&keys::products_list(qualifier), products, Some(self.ttls.list))
            .await
    }

    /// Drop every single-product and list entry
    pub async fn invalidate_all_products(&self) -> u64 {
        self.delete_patterns(patterns::PRODUCT_WRITE).await
    }

    // Users

    pub async fn get_user_profile<T: DeserializeOwned>(&self, user_id: &str) -> Option<T> {
        self.get_json(&keys::user_profile(user_id)).await
    }

    pub async fn set_user_profile<T: Serialize + ?Sized>(&self, user_id: &str, profile: &T) -> bool {
        self.set(&keys::user_profile(user_id), profile, None).await
    }

    pub async fn invalidate_user_profile(&self, user_id: &str) -> bool {
        self.delete(&keys::user_profile(user_id)).await
    }

    pub async fn get_user_session<T: DeserializeOwned>(&self, user_id: &str) -> Option<T> {
        self.get_json(&keys::user_session(user_id)).await
    }

    pub async fn set_user_session<T: Serialize + ?Sized>(&self, user_id: &str, session: &T) -> bool {
        self.set(&keys::user_session(user_id), session, Some(self.ttls.session))
            .await
    }

    pub async fn invalidate_user_session(&self, user_id: &str) -> bool {
        self.delete(&keys::user_session(user_id)).await
    }

    /// Count-only fixed-window check on `rate_limit:{key}`.
    ///
    /// Returns `(allowed, current_count)`; an unreachable store allows with a
    /// count of 0.
    pub async fn check_rate_limit(&self, key: &str, limit: u64, window_seconds: u64) -> (bool, i64) {
        let window = Duration::from_secs(window_seconds.max(1));
        match self.store.increment(&keys::rate_limit(key), 1, Some(window)).await {
            Some(current) => {
                let allowed = current <= i64::try_from(limit).unwrap_or(i64::MAX);
                if !allowed {
                    warn!(key = %key, current, limit, "Rate limit exceeded");
                }
                (allowed, current)
            }
            None => (true, 0),
        }
    }
}
