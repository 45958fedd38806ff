//! Tests against a real hosted project.
//!
//! These tests require:
//! - `OJA_BACKEND_URL` and `OJA_BACKEND_ANON_KEY` for a test project
//! - `OJA_BACKEND_SERVICE_KEY` for the admin test
//! - The products, orders, profiles and notifications tables
//!
//! Run with: cargo test -p oja-integration-tests -- --ignored

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use std::sync::Arc;

use oja_admin::AdminConsole;
use oja_core::{Naira, OrderStatus};
use oja_integration_tests::{lagos_checkout, product};
use oja_storefront::Storefront;
use oja_storefront::backend::{HostedStore, RestClient};
use oja_storefront::config::StorefrontConfig;
use oja_storefront::storage::MemoryStorage;
use oja_storefront::tracking::TrackedOrder;

fn config() -> StorefrontConfig {
    StorefrontConfig::from_env().expect("OJA_BACKEND_URL and OJA_BACKEND_ANON_KEY must be set")
}

#[tokio::test]
#[ignore = "Requires a hosted project"]
async fn test_live_product_list_normalizes() {
    let client = RestClient::new(&config().backend).unwrap();
    let products = client.list_products().await.unwrap();
    assert!(!products.is_empty());
    for p in &products {
        assert!(!p.id.as_str().is_empty());
        assert!(!p.price.is_negative());
        if let Some(stock) = p.stock {
            assert_eq!(p.in_stock, stock > 0);
        }
    }
}

#[tokio::test]
#[ignore = "Requires a hosted project; writes an order row"]
async fn test_live_guest_order_is_trackable() {
    let config = config();
    let backend = Arc::new(RestClient::new(&config.backend).unwrap());
    let storefront =
        Storefront::with_backend(backend, Arc::new(MemoryStorage::new()), config.catalog_ttl);
    storefront.start().await;

    let store = storefront.store();
    store.add_to_cart(&product("integration-test", 1_000));
    let order = store.place_order(lagos_checkout()).await.unwrap();
    assert_eq!(order.total_amount, Naira::whole(3_500));

    let found = storefront.tracker().lookup(&order.tracking_code).await.unwrap();
    assert!(matches!(found, TrackedOrder::Remote(_)));
}

#[tokio::test]
#[ignore = "Requires a hosted project and service key; changes an order status"]
async fn test_live_status_change_writes_notification() {
    let config = config();
    let client = RestClient::elevated(&config.backend).unwrap();
    let console = AdminConsole::for_service(client, config.image_bucket.clone()).unwrap();

    let orders = console.list_orders().await.unwrap();
    let Some(order) = orders.iter().find(|o| o.user_id.is_some() && !o.status.is_terminal()) else {
        return;
    };
    let change = console
        .set_order_status(order.id, order.user_id, OrderStatus::Processing)
        .await
        .unwrap();
    assert_eq!(change.status, OrderStatus::Processing);
}
