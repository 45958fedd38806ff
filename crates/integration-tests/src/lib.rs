//! Integration tests for Oja.
//!
//! # Running Tests
//!
//! ```bash
//! # In-memory end-to-end flows
//! cargo test -p oja-integration-tests
//!
//! # Against a real hosted project (needs OJA_BACKEND_URL etc.)
//! cargo test -p oja-integration-tests -- --ignored
//! ```
//!
//! # Test Categories
//!
//! - `checkout_flow` - buyer and admin flows over the in-memory store
//! - `live_backend` - the REST client against a real project

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;

use oja_core::{CheckoutDetails, Email, Naira, PaymentMethod, Product, ProductId, Role, UserId};
use oja_storefront::Storefront;
use oja_storefront::backend::{HostedStore, MemoryStore};
use oja_storefront::storage::MemoryStorage;

/// An in-memory hosted store plus one buyer device.
pub struct TestContext {
    pub backend: Arc<MemoryStore>,
    pub device: Arc<MemoryStorage>,
    pub storefront: Storefront,
}

impl TestContext {
    #[must_use]
    pub fn new(products: Vec<Product>) -> Self {
        let backend = Arc::new(MemoryStore::with_products(products));
        let device = Arc::new(MemoryStorage::new());
        let storefront =
            Storefront::with_backend(backend.clone(), device.clone(), Duration::from_secs(60));
        Self {
            backend,
            device,
            storefront,
        }
    }

    /// Create an account and sign it in on the shared store.
    pub async fn sign_in(&self, email: &str, role: Role) -> UserId {
        let email = Email::parse(email).unwrap();
        let user = self.backend.add_account(&email, "password", role);
        self.backend
            .sign_in(&email, &SecretString::from("password"))
            .await
            .unwrap();
        user
    }
}

/// A product with enough stock to sell.
#[must_use]
pub fn product(id: &str, price: i64) -> Product {
    Product {
        id: ProductId::from(id),
        name: format!("Item {id}"),
        price: Naira::whole(price),
        category: "dresses".to_string(),
        size: Some("M".to_string()),
        kind: None,
        description: None,
        stock: Some(10),
        in_stock: true,
        image: Some(format!("/images/{id}.jpg")),
    }
}

/// Checkout details for an Ikeja delivery (₦2,500).
#[must_use]
pub fn lagos_checkout() -> CheckoutDetails {
    CheckoutDetails {
        contact_email: Email::parse("ada@example.com").unwrap(),
        contact_phone: "08012345678".to_string(),
        shipping_address: "12 Allen Avenue".to_string(),
        shipping_state: "Lagos".to_string(),
        shipping_area: Some("Ikeja / Maryland / Anthony".to_string()),
        payment_method: PaymentMethod::BankTransfer,
    }
}

/// Let spawned listener tasks run.
pub async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}
