//! Cache types for catalog responses.

use std::sync::Arc;

use oja_core::Product;

/// Cache key for catalog lookups.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum CacheKey {
    ProductList,
}

/// Cached product list, shared without copying.
pub type CachedProducts = Arc<Vec<Product>>;
