//! Product catalog accessor.
//!
//! - Fetches the product list from the hosted store, cached with `moka`
//! - Falls back to a bundled snapshot when the fetch fails, so the storefront
//!   never renders empty because of a network problem
//! - Applies realtime product updates in place (price and availability only)

mod cache;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use moka::future::Cache;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use oja_core::{Product, ProductId};

use crate::backend::{ChangeEvent, HostedStore, ProductRecord, Topic};
use cache::{CacheKey, CachedProducts};

const BUNDLED_CATALOG: &str = include_str!("../../data/catalog.json");

/// Where the current product list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogSource {
    Live,
    Cached,
    Bundled,
}

/// Catalog state for one storefront instance.
pub struct Catalog {
    backend: Arc<dyn HostedStore>,
    cache: Cache<CacheKey, CachedProducts>,
    shown: Mutex<Vec<Product>>,
}

impl Catalog {
    /// Create a catalog whose fetched list stays fresh for `ttl`.
    #[must_use]
    pub fn new(backend: Arc<dyn HostedStore>, ttl: Duration) -> Self {
        let cache = Cache::builder().max_capacity(4).time_to_live(ttl).build();
        Self {
            backend,
            cache,
            shown: Mutex::new(Vec::new()),
        }
    }

    fn shown(&self) -> MutexGuard<'_, Vec<Product>> {
        self.shown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch the product list, never failing.
    #[instrument(skip(self))]
    pub async fn list(&self) -> Vec<Product> {
        self.list_with_source().await.0
    }

    /// Like [`Catalog::list`], also reporting where the list came from.
    pub async fn list_with_source(&self) -> (Vec<Product>, CatalogSource) {
        if let Some(cached) = self.cache.get(&CacheKey::ProductList).await {
            debug!("Cache hit for product list");
            let products = cached.as_ref().clone();
            self.shown().clone_from(&products);
            return (products, CatalogSource::Cached);
        }

        match self.backend.list_products().await {
            Ok(products) => {
                self.cache
                    .insert(CacheKey::ProductList, Arc::new(products.clone()))
                    .await;
                self.shown().clone_from(&products);
                (products, CatalogSource::Live)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Product fetch failed, showing bundled catalog");
                let products = bundled_catalog();
                self.shown().clone_from(&products);
                (products, CatalogSource::Bundled)
            }
        }
    }

    /// Products currently held in memory.
    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        self.shown().clone()
    }

    #[must_use]
    pub fn get(&self, id: &ProductId) -> Option<Product> {
        self.shown().iter().find(|p| &p.id == id).cloned()
    }

    /// Patch price and availability of a held product from a pushed row.
    ///
    /// Returns whether a held product changed. Updates for products not on
    /// display are ignored.
    pub async fn apply_update(&self, updated: &Product) -> bool {
        let changed = {
            let mut shown = self.shown();
            match shown.iter_mut().find(|p| p.id == updated.id) {
                Some(product) => {
                    let before = (product.price, product.stock, product.in_stock);
                    product.price = updated.price;
                    product.stock = updated.stock;
                    product.in_stock = updated.in_stock;
                    before != (product.price, product.stock, product.in_stock)
                }
                None => false,
            }
        };

        // The cached list no longer matches the store either way.
        self.cache.invalidate(&CacheKey::ProductList).await;
        if changed {
            debug!(product_id = %updated.id, "Applied realtime product update");
        }
        changed
    }

    /// Keep the held products current from the realtime feed.
    ///
    /// The task ends when the catalog is dropped or the feed closes; abort the
    /// handle to stop it earlier.
    pub fn watch(self: &Arc<Self>) -> JoinHandle<()> {
        let mut subscription = self.backend.subscribe(Topic::Products);
        let catalog = Arc::downgrade(self);
        tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let Some(catalog) = catalog.upgrade() else {
                    break;
                };
                if let ChangeEvent::ProductUpdated(product) = event {
                    catalog.apply_update(&product).await;
                }
            }
        })
    }
}

/// The catalog snapshot shipped with the binary.
#[must_use]
pub fn bundled_catalog() -> Vec<Product> {
    match serde_json::from_str::<Vec<ProductRecord>>(BUNDLED_CATALOG) {
        Ok(records) => records.into_iter().map(Product::from).collect(),
        Err(e) => {
            tracing::error!(error = %e, "Bundled catalog is unreadable");
            Vec::new()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{FailPoint, MemoryStore};
    use oja_core::Naira;

    fn product(id: &str, price: i64, stock: u32) -> Product {
        Product {
            id: ProductId::from(id),
            name: format!("Item {id}"),
            price: Naira::whole(price),
            category: "dresses".to_string(),
            size: None,
            kind: None,
            description: None,
            stock: Some(stock),
            in_stock: stock > 0,
            image: None,
        }
    }

    #[test]
    fn test_bundled_catalog_parses() {
        let products = bundled_catalog();
        assert!(!products.is_empty());
        assert!(products.iter().all(|p| !p.name.is_empty()));
    }

    #[tokio::test]
    async fn test_falls_back_to_bundled_on_error() {
        let store = Arc::new(MemoryStore::with_products(vec![product("p1", 100, 1)]));
        store.fail(FailPoint::ListProducts);
        let catalog = Catalog::new(store, Duration::from_secs(60));

        let (products, source) = catalog.list_with_source().await;
        assert_eq!(source, CatalogSource::Bundled);
        assert_eq!(products, bundled_catalog());
    }

    #[tokio::test]
    async fn test_second_list_is_cached() {
        let store = Arc::new(MemoryStore::with_products(vec![product("p1", 100, 1)]));
        let catalog = Catalog::new(store.clone(), Duration::from_secs(60));

        assert_eq!(catalog.list_with_source().await.1, CatalogSource::Live);
        store.fail(FailPoint::ListProducts);
        let (products, source) = catalog.list_with_source().await;
        assert_eq!(source, CatalogSource::Cached);
        assert_eq!(products.len(), 1);
    }

    #[tokio::test]
    async fn test_update_patches_price_and_stock_only() {
        let store = Arc::new(MemoryStore::with_products(vec![product("p1", 100, 3)]));
        let catalog = Catalog::new(store, Duration::from_secs(60));
        catalog.list().await;

        let mut pushed = product("p1", 150, 0);
        pushed.name = "Renamed elsewhere".to_string();
        assert!(catalog.apply_update(&pushed).await);

        let held = catalog.get(&ProductId::from("p1")).unwrap();
        assert_eq!(held.price, Naira::whole(150));
        assert!(!held.in_stock);
        assert_eq!(held.name, "Item p1");

        assert!(!catalog.apply_update(&product("p9", 1, 1)).await);
    }

    #[tokio::test]
    async fn test_watch_applies_pushed_updates() {
        let store = Arc::new(MemoryStore::with_products(vec![product("p1", 100, 3)]));
        let catalog = Arc::new(Catalog::new(store.clone(), Duration::from_secs(60)));
        catalog.list().await;
        let task = catalog.watch();

        store.push(ChangeEvent::ProductUpdated(product("p1", 90, 3)));
        for _ in 0..50 {
            if catalog.get(&ProductId::from("p1")).unwrap().price == Naira::whole(90) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(catalog.get(&ProductId::from("p1")).unwrap().price, Naira::whole(90));
        task.abort();
    }
}
