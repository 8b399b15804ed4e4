//! Bazaar - Redis-backed caching and rate limiting for the storefront API
//!
//! This library provides the cache tier shared by the storefront services:
//! a degrading key-value store, a cache service with read-through and
//! invalidation wrappers, a fixed-window rate limiter, session storage and
//! the axum middleware and operational routes built on them.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod docs;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod store;

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

pub use crate::cache::{CacheService, RateLimiter, SessionStore};
pub use crate::config::{CacheBackend, Config};
pub use crate::store::{InMemoryBackend, KeyValueStore};

/// Application state shared across all request handlers
pub struct AppState {
    pub config: Config,
    /// Shared store handle; the cache, limiter and sessions all use it
    pub store: Arc<KeyValueStore>,
    pub cache: CacheService,
    pub rate_limiter: RateLimiter,
    pub sessions: SessionStore,
    pub start_time: Instant,
    /// Set when running on the in-process backend
    memory_backend: Option<Arc<InMemoryBackend>>,
}

impl AppState {
    /// Create a new application state
    ///
    /// An unreachable Redis is not fatal: the service starts uncached and
    /// `/health` reports `degraded`.
    pub async fn new(config: Config) -> Self {
        let (store, memory_backend) = match config.cache_backend {
            CacheBackend::Redis => {
                let store = Arc::new(KeyValueStore::new(config.redis.clone()));
                let connected = store
                    .connect_with_retry(config.redis.connect_retries, config.redis.retry_delay)
                    .await;
                if !connected {
                    warn!("Starting without cache; requests will hit the primary data store");
                }
                (store, None)
            }
            CacheBackend::Memory => {
                info!("Using in-memory cache backend");
                let backend = Arc::new(InMemoryBackend::new());
                let store = Arc::new(KeyValueStore::with_backend(backend.clone()));
                (store, Some(backend))
            }
        };

        Self::assemble(config, store, memory_backend)
    }

    /// Create an application state over a fresh in-memory store
    ///
    /// The backend is reachable through `memory_backend()` so tests can
    /// inspect keys or simulate an outage.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn new_for_testing(mut config: Config) -> Self {
        config.cache_backend = CacheBackend::Memory;
        let backend = Arc::new(InMemoryBackend::new());
        let store = Arc::new(KeyValueStore::with_backend(backend.clone()));
        Self::assemble(config, store, Some(backend))
    }

    fn assemble(
        config: Config,
        store: Arc<KeyValueStore>,
        memory_backend: Option<Arc<InMemoryBackend>>,
    ) -> Self {
        let cache = CacheService::new(store.clone(), config.cache_ttl);
        let rate_limiter = RateLimiter::new(store.clone());
        let sessions = SessionStore::new(cache.clone(), config.token_blacklist_ttl);

        Self {
            config,
            store,
            cache,
            rate_limiter,
            sessions,
            start_time: Instant::now(),
            memory_backend,
        }
    }

    /// In-process backend, when the state was built on one
    pub fn memory_backend(&self) -> Option<&Arc<InMemoryBackend>> {
        self.memory_backend.as_ref()
    }

    /// Release store connections
    pub async fn shutdown(&self) {
        self.store.disconnect().await;
    }
}
