//! Storefront context shared by every view.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::backend::{HostedStore, RestClient};
use crate::catalog::Catalog;
use crate::config::StorefrontConfig;
use crate::error::StartupError;
use crate::storage::{DeviceStorage, FileStorage};
use crate::store::CartStore;
use crate::tracking::OrderTracker;

/// Everything a storefront session needs, built once and handed out.
///
/// This struct is cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct Storefront {
    inner: Arc<StorefrontInner>,
}

struct StorefrontInner {
    backend: Arc<dyn HostedStore>,
    catalog: Arc<Catalog>,
    store: Arc<CartStore>,
    tracker: OrderTracker,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Storefront {
    /// Build a storefront talking to the configured hosted project.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the state
    /// directory cannot be created.
    pub fn from_config(config: &StorefrontConfig) -> Result<Self, StartupError> {
        let backend: Arc<dyn HostedStore> = Arc::new(RestClient::new(&config.backend)?);
        let storage: Arc<dyn DeviceStorage> = Arc::new(FileStorage::open(&config.state_dir)?);
        Ok(Self::with_backend(backend, storage, config.catalog_ttl))
    }

    /// Build a storefront over any backend and device storage.
    #[must_use]
    pub fn with_backend(
        backend: Arc<dyn HostedStore>,
        storage: Arc<dyn DeviceStorage>,
        catalog_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(StorefrontInner {
                catalog: Arc::new(Catalog::new(Arc::clone(&backend), catalog_ttl)),
                store: Arc::new(CartStore::new(Arc::clone(&backend), Arc::clone(&storage))),
                tracker: OrderTracker::new(Arc::clone(&backend), storage),
                backend,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Restore the session, load the catalog and start following updates.
    ///
    /// Never fails; degraded loads are logged by the parts themselves.
    pub async fn start(&self) {
        let inner = &self.inner;
        inner.store.initialize().await;
        inner.catalog.list().await;

        let mut tasks = inner.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if tasks.is_empty() {
            tasks.push(inner.store.watch_auth());
            tasks.push(inner.catalog.watch());
        }
        tracing::info!(
            products = inner.catalog.products().len(),
            items = inner.store.cart().item_count(),
            "Storefront started"
        );
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn HostedStore> {
        &self.inner.backend
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CartStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn tracker(&self) -> &OrderTracker {
        &self.inner.tracker
    }
}

impl Drop for StorefrontInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner).drain(..) {
            task.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{AuthEvent, MemoryStore};
    use crate::storage::MemoryStorage;
    use oja_core::{Email, Role};
    use secrecy::SecretString;

    #[tokio::test]
    async fn test_start_follows_sign_out() {
        let backend = Arc::new(MemoryStore::with_products(crate::catalog::bundled_catalog()));
        let email = Email::parse("ada@example.com").unwrap();
        backend.add_account(&email, "pw", Role::Member);
        backend.sign_in(&email, &SecretString::from("pw")).await.unwrap();

        let storefront = Storefront::with_backend(
            backend.clone(),
            Arc::new(MemoryStorage::new()),
            Duration::from_secs(60),
        );
        storefront.start().await;
        assert!(storefront.store().identity().user_id().is_some());

        let product = storefront.catalog().products().into_iter().next().unwrap();
        storefront.store().add_to_cart(&product);

        let mut events = backend.auth_events();
        backend.sign_out().await.unwrap();
        assert_eq!(events.recv().await.unwrap(), AuthEvent::SignedOut);
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(storefront.store().cart().is_empty());
    }
}
