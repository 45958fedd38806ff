//! Row shapes at the ingestion boundary.
//!
//! Product rows arrive from two places that never agreed on field names: the
//! hosted `products` table (`image_url`, integer `stock`) and older catalog
//! exports (`image`, boolean `inStock`, prices as text). [`ProductRecord`]
//! accepts both and [`Product::from`] is the one place they are reconciled.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use oja_core::{Cart, CartLine, Naira, Product, ProductId, Role};

/// A product row as stored, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductRecord {
    #[serde(deserialize_with = "text_or_number")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stock: Option<Value>,
    #[serde(default, alias = "inStock")]
    pub in_stock: Option<bool>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

impl From<ProductRecord> for Product {
    fn from(record: ProductRecord) -> Self {
        let price = record
            .price
            .as_ref()
            .and_then(coerce_decimal)
            .map_or_else(
                || {
                    tracing::warn!(product_id = %record.id, "Product row has no usable price");
                    Naira::ZERO
                },
                Naira::new,
            );

        // Negative counts have been seen in old rows; they mean "none left".
        let stock = record
            .stock
            .as_ref()
            .and_then(coerce_decimal)
            .map(|d| d.trunc().to_i64().and_then(|n| u32::try_from(n).ok()).unwrap_or(0));
        let in_stock = match (stock, record.in_stock) {
            (Some(count), _) => count > 0,
            (None, Some(flag)) => flag,
            (None, None) => true,
        };

        let image = record
            .image_url
            .filter(|s| !s.is_empty())
            .or(record.image)
            .filter(|s| !s.is_empty());

        Self {
            id: ProductId::new(record.id),
            name: record.name,
            price,
            category: record.category.unwrap_or_default(),
            size: record.size,
            kind: record.kind,
            description: record.description,
            stock,
            in_stock,
            image,
        }
    }
}

/// Read a JSON number or numeric string as a decimal.
fn coerce_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .map(Decimal::from)
            .or_else(|| n.as_f64().and_then(|f| Decimal::try_from(f).ok())),
        Value::String(s) => {
            let cleaned = s.trim().trim_start_matches('₦').replace(',', "");
            Decimal::from_str(&cleaned).ok()
        }
        _ => None,
    }
}

fn text_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}

/// Insert/update payload for the `products` table.
///
/// `None` fields are left out of the request so an update only touches what
/// it names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProductPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<ProductId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<Naira>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

impl ProductPatch {
    /// Apply the named fields to an in-memory product.
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(name) = &self.name {
            product.name.clone_from(name);
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(category) = &self.category {
            product.category.clone_from(category);
        }
        if self.size.is_some() {
            product.size.clone_from(&self.size);
        }
        if self.kind.is_some() {
            product.kind.clone_from(&self.kind);
        }
        if self.description.is_some() {
            product.description.clone_from(&self.description);
        }
        if let Some(stock) = self.stock {
            product.set_stock(stock);
        }
        if self.image_url.is_some() {
            product.image.clone_from(&self.image_url);
        }
    }
}

/// A cart as persisted on the device and on the profile row.
///
/// `version` increases with every local write so that a stale server copy
/// can at least be noticed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredCart")]
pub struct CartSnapshot {
    pub version: u64,
    pub saved_at: Option<DateTime<Utc>>,
    pub lines: Vec<CartLine>,
}

impl CartSnapshot {
    #[must_use]
    pub fn new(version: u64, cart: &Cart) -> Self {
        Self {
            version,
            saved_at: Some(Utc::now()),
            lines: cart.lines().to_vec(),
        }
    }

    #[must_use]
    pub fn into_cart(self) -> Cart {
        Cart::from_lines(self.lines)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Either the versioned object or the bare line array older clients wrote.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredCart {
    Versioned {
        version: u64,
        #[serde(default)]
        saved_at: Option<DateTime<Utc>>,
        #[serde(default)]
        lines: Vec<CartLine>,
    },
    Legacy(Vec<CartLine>),
}

impl From<StoredCart> for CartSnapshot {
    fn from(stored: StoredCart) -> Self {
        match stored {
            StoredCart::Versioned {
                version,
                saved_at,
                lines,
            } => Self {
                version,
                saved_at,
                lines,
            },
            StoredCart::Legacy(lines) => Self {
                version: 0,
                saved_at: None,
                lines,
            },
        }
    }
}

/// The columns of `profiles` this crate reads.
#[derive(Debug, Clone, Deserialize)]
pub struct ProfileRow {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub cart: Option<Value>,
}

impl ProfileRow {
    /// Decode the `cart` column. Null, empty and unreadable carts are `None`.
    #[must_use]
    pub fn cart_snapshot(&self) -> Option<CartSnapshot> {
        let value = self.cart.as_ref().filter(|v| !v.is_null())?;
        match serde_json::from_value::<CartSnapshot>(value.clone()) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable cart on profile");
                None
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn normalize(value: Value) -> Product {
        Product::from(serde_json::from_value::<ProductRecord>(value).unwrap())
    }

    #[test]
    fn test_table_row_shape() {
        let product = normalize(json!({
            "id": 42, "name": "Aso Oke Set", "price": 45000, "category": "sets",
            "type": "two-piece", "stock": 3, "image_url": "https://cdn/aso.jpg"
        }));
        assert_eq!(product.id.as_str(), "42");
        assert_eq!(product.price, Naira::whole(45_000));
        assert_eq!(product.stock, Some(3));
        assert!(product.in_stock);
        assert_eq!(product.kind.as_deref(), Some("two-piece"));
        assert_eq!(product.image.as_deref(), Some("https://cdn/aso.jpg"));
    }

    #[test]
    fn test_legacy_row_shape() {
        let product = normalize(json!({
            "id": "p7", "name": "Ankara Midi", "price": "₦12,500", "inStock": false,
            "image": "/images/ankara-midi.jpg"
        }));
        assert_eq!(product.price, Naira::whole(12_500));
        assert_eq!(product.stock, None);
        assert!(!product.in_stock);
        assert_eq!(product.image.as_deref(), Some("/images/ankara-midi.jpg"));
    }

    #[test]
    fn test_stock_count_wins_over_flag_and_clamps() {
        let product = normalize(json!({
            "id": "p1",
            "name": "x",
            "price": 1,
            "stock": -4,
            "in_stock": true
        }));
        assert_eq!(product.stock, Some(0));
        assert!(!product.in_stock);
    }

    #[test]
    fn test_empty_image_url_falls_back_to_image() {
        let product = normalize(json!({
            "id": "p1",
            "name": "x",
            "price": 1,
            "image_url": "",
            "image": "b.jpg"
        }));
        assert_eq!(product.image.as_deref(), Some("b.jpg"));
    }

    #[test]
    fn test_patch_skips_unset_fields() {
        let patch = ProductPatch {
            stock: Some(0),
            ..ProductPatch::default()
        };
        assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"stock": 0}));
    }

    #[test]
    fn test_cart_snapshot_reads_legacy_array() {
        let legacy = json!([{"id": "p1", "name": "x", "price": 100, "quantity": 2}]);
        let snapshot: CartSnapshot = serde_json::from_value(legacy).unwrap();
        assert_eq!(snapshot.version, 0);
        assert_eq!(snapshot.into_cart().item_count(), 2);
    }

    #[test]
    fn test_cart_snapshot_versioned_round_trip() {
        let mut cart = Cart::new();
        cart.add(&normalize(json!({"id": "p1", "name": "x", "price": 100})));
        let snapshot = CartSnapshot::new(7, &cart);
        let json = serde_json::to_value(&snapshot).unwrap();
        let back: CartSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn test_profile_without_cart() {
        let row: ProfileRow =
            serde_json::from_value(json!({"role": "admin", "cart": null})).unwrap();
        assert_eq!(row.role, Role::Admin);
        assert!(row.cart_snapshot().is_none());
    }
}
