//! Tracking codes and order lookup.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use oja_core::{GuestOrder, Order, OrderId};

use crate::backend::HostedStore;
use crate::storage::{DeviceStorage, DeviceStorageExt, keys};

/// Prefix of every tracking code.
pub const TRACKING_PREFIX: &str = "OJA-";

/// Characters used after the prefix. No `0/O` or `1/I/L` so codes survive
/// being read out over the phone.
const TRACKING_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

const TRACKING_LEN: usize = 8;

/// Generate a fresh tracking code, e.g. `OJA-7KQ2MX9D`.
#[must_use]
pub fn generate_tracking_code() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..TRACKING_LEN)
        .map(|_| {
            let index = rng.random_range(0..TRACKING_ALPHABET.len());
            char::from(TRACKING_ALPHABET.get(index).copied().unwrap_or(b'X'))
        })
        .collect();
    format!("{TRACKING_PREFIX}{suffix}")
}

/// Canonical form of a tracking code typed by a buyer.
#[must_use]
pub fn normalize_tracking_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

/// The order just placed on this device, kept for the confirmation page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastOrder {
    pub order_id: OrderId,
    pub tracking_code: String,
}

/// Result of a tracking lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackedOrder {
    /// Found in the hosted store, with its current status.
    Remote(Order),
    /// Only known from this device's guest order list.
    Local(GuestOrder),
}

impl TrackedOrder {
    #[must_use]
    pub fn tracking_code(&self) -> &str {
        match self {
            Self::Remote(order) => &order.tracking_code,
            Self::Local(order) => &order.tracking_code,
        }
    }

    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        match self {
            Self::Remote(order) => order.id,
            Self::Local(order) => order.order_id,
        }
    }
}

/// Looks orders up by tracking code.
pub struct OrderTracker {
    backend: Arc<dyn HostedStore>,
    storage: Arc<dyn DeviceStorage>,
}

impl OrderTracker {
    #[must_use]
    pub fn new(backend: Arc<dyn HostedStore>, storage: Arc<dyn DeviceStorage>) -> Self {
        Self { backend, storage }
    }

    /// Find an order by tracking code.
    ///
    /// Asks the hosted store first; if it is unreachable or has no match, the
    /// device's guest order list is searched instead.
    #[instrument(skip(self))]
    pub async fn lookup(&self, code: &str) -> Option<TrackedOrder> {
        let code = normalize_tracking_code(code);
        if code.is_empty() {
            return None;
        }

        match self.backend.order_by_tracking_code(&code).await {
            Ok(Some(order)) => return Some(TrackedOrder::Remote(order)),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Tracking lookup failed, checking this device"),
        }

        self.guest_orders()
            .into_iter()
            .find(|o| normalize_tracking_code(&o.tracking_code) == code)
            .map(TrackedOrder::Local)
    }

    /// Orders placed on this device without an account, oldest first.
    #[must_use]
    pub fn guest_orders(&self) -> Vec<GuestOrder> {
        self.storage
            .load::<Vec<GuestOrder>>(keys::GUEST_ORDERS)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Guest order list is unreadable");
                None
            })
            .unwrap_or_default()
    }

    /// The order just placed, removed so a reload does not show it again.
    #[must_use]
    pub fn take_last_order(&self) -> Option<LastOrder> {
        self.storage
            .take(keys::LAST_ORDER)
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Last order record is unreadable");
                None
            })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::backend::{FailPoint, MemoryStore};
    use crate::storage::MemoryStorage;
    use chrono::Utc;
    use oja_core::Naira;

    #[test]
    fn test_tracking_code_format() {
        for _ in 0..100 {
            let code = generate_tracking_code();
            let suffix = code.strip_prefix(TRACKING_PREFIX).unwrap();
            assert_eq!(suffix.len(), TRACKING_LEN);
            assert!(suffix.bytes().all(|b| TRACKING_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn test_normalize_tracking_code() {
        assert_eq!(normalize_tracking_code("  oja-ab12cd34 \n"), "OJA-AB12CD34");
    }

    fn guest_order(code: &str) -> GuestOrder {
        GuestOrder {
            tracking_code: code.to_string(),
            order_id: OrderId::random(),
            date: Utc::now(),
            total: Naira::whole(12_500),
            items: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_lookup_falls_back_to_device_list() {
        let backend = Arc::new(MemoryStore::new());
        backend.fail(FailPoint::ReadOrders);
        let storage = Arc::new(MemoryStorage::new());
        storage
            .save(keys::GUEST_ORDERS, &vec![guest_order("OJA-AAAA2222")])
            .unwrap();

        let tracker = OrderTracker::new(backend, storage);
        let found = tracker.lookup(" oja-aaaa2222").await.unwrap();
        assert!(matches!(found, TrackedOrder::Local(_)));
        assert_eq!(found.tracking_code(), "OJA-AAAA2222");
        assert!(tracker.lookup("OJA-ZZZZ9999").await.is_none());
        assert!(tracker.lookup("   ").await.is_none());
    }

    #[test]
    fn test_take_last_order_is_single_use() {
        let storage = Arc::new(MemoryStorage::new());
        let last = LastOrder {
            order_id: OrderId::random(),
            tracking_code: "OJA-AAAA2222".to_string(),
        };
        storage.save(keys::LAST_ORDER, &last).unwrap();

        let tracker = OrderTracker::new(Arc::new(MemoryStore::new()), storage.clone());
        assert_eq!(tracker.take_last_order(), Some(last));
        assert_eq!(tracker.take_last_order(), None);
        assert!(!storage.contains(keys::LAST_ORDER));
    }
}
