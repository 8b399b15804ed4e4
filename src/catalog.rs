//! Product catalog repository
//!
//! `ProductRepository` is the data-source seam. `CachedProductRepository`
//! wraps any implementation with read-through caching on reads and family
//! invalidation on writes, without the wrapped repository knowing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::cache::{keys, CacheService};

/// Catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub price_cents: i64,
    pub in_stock: bool,
}

/// List query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFilter {
    pub category: Option<String>,
    pub search: Option<String>,
    pub skip: u32,
    pub limit: u32,
}

impl Default for ProductFilter {
    fn default() -> Self {
        Self {
            category: None,
            search: None,
            skip: 0,
            limit: 20,
        }
    }
}

impl ProductFilter {
    /// Key qualifier: SHA-256 of the JSON-encoded filter, so distinct
    /// queries never share a key whatever their field contents
    pub fn cache_qualifier(&self) -> String {
        let encoded = json!([self.skip, self.limit, self.category, self.search]).to_string();
        hex::encode(Sha256::digest(encoded.as_bytes()))
    }
}

/// Repository failures
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Product not found: {0}")]
    NotFound(String),

    #[error("Catalog backend error: {0}")]
    Backend(String),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// Product data source
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get(&self, id: &str) -> CatalogResult<Option<Product>>;

    async fn list(&self, filter: &ProductFilter) -> CatalogResult<Vec<Product>>;

    async fn create(&self, product: Product) -> CatalogResult<Product>;

    async fn update(&self, product: Product) -> CatalogResult<Product>;

    async fn delete(&self, id: &str) -> CatalogResult<bool>;
}

/// Caching decorator over a `ProductRepository`.
///
/// Reads use `product:{id}` (entity TTL) and `products:list:{filter}` (list
/// TTL); every write purges `product:*` and `products:*`.
pub struct CachedProductRepository<R> {
    inner: R,
    cache: CacheService,
}

impl<R> CachedProductRepository<R> {
    pub fn new(inner: R, cache: CacheService) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

#[async_trait]
impl<R: ProductRepository> ProductRepository for CachedProductRepository<R> {
    async fn get(&self, id: &str) -> CatalogResult<Option<Product>> {
        let ttl = self.cache.ttls().entity;
        self.cache
            .read_through(&keys::product(id), Some(ttl), || self.inner.get(id))
            .await
    }

    async fn list(&self, filter: &ProductFilter) -> CatalogResult<Vec<Product>> {
        let ttl = self.cache.ttls().list;
        let key = keys::products_list(&filter.cache_qualifier());
        self.cache
            .read_through(&key, Some(ttl), || self.inner.list(filter))
            .await
    }

    async fn create(&self, product: Product) -> CatalogResult<Product> {
        self.cache
            .invalidate_after(keys::patterns::PRODUCT_WRITE, || self.inner.create(product))
            .await
    }

    async fn update(&self, product: Product) -> CatalogResult<Product> {
        self.cache
            .invalidate_after(keys::patterns::PRODUCT_WRITE, || self.inner.update(product))
            .await
    }

    async fn delete(&self, id: &str) -> CatalogResult<bool> {
        self.cache
            .invalidate_after(keys::patterns::PRODUCT_WRITE, || self.inner.delete(id))
            .await
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use self::testing::InMemoryProductRepository;

#[cfg(any(test, feature = "test-utils"))]
mod testing {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{PoisonError, RwLock};

    use super::*;

    /// Map-backed repository that counts reads reaching it
    #[derive(Default)]
    pub struct InMemoryProductRepository {
        products: RwLock<BTreeMap<String, Product>>,
        reads: AtomicUsize,
    }

    impl InMemoryProductRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
            let repo = Self::new();
            {
                let mut map = repo.products.write().unwrap_or_else(PoisonError::into_inner);
                for product in products {
                    map.insert(product.id.clone(), product);
                }
            }
            repo
        }

        /// Number of `get`/`list` calls served
        pub fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProductRepository for InMemoryProductRepository {
        async fn get(&self, id: &str) -> CatalogResult<Option<Product>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let map = self.products.read().unwrap_or_else(PoisonError::into_inner);
            Ok(map.get(id).cloned())
        }

        async fn list(&self, filter: &ProductFilter) -> CatalogResult<Vec<Product>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let map = self.products.read().unwrap_or_else(PoisonError::into_inner);
            Ok(map
                .values()
                .filter(|p| filter.category.is_none() || p.category == filter.category)
                .filter(|p| {
                    filter
                        .search
                        .as_deref()
                        .map_or(true, |s| p.name.to_lowercase().contains(&s.to_lowercase()))
                })
                .skip(filter.skip as usize)
                .take(filter.limit as usize)
                .cloned()
                .collect())
        }

        async fn create(&self, product: Product) -> CatalogResult<Product> {
            let mut map = self.products.write().unwrap_or_else(PoisonError::into_inner);
            map.insert(product.id.clone(), product.clone());
            Ok(product)
        }

        async fn update(&self, product: Product) -> CatalogResult<Product> {
            let mut map = self.products.write().unwrap_or_else(PoisonError::into_inner);
            match map.get_mut(&product.id) {
                Some(existing) => {
                    *existing = product.clone();
                    Ok(product)
                }
                None => Err(CatalogError::NotFound(product.id)),
            }
        }

        async fn delete(&self, id: &str) -> CatalogResult<bool> {
            let mut map = self.products.write().unwrap_or_else(PoisonError::into_inner);
            Ok(map.remove(id).is_some())
        }
    }
}
