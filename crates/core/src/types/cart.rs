//! Cart contents and the arithmetic on them.
//!
//! The JSON shape of [`CartLine`] is what gets persisted to the device and to
//! the account's profile row, so field names follow the stored format.

use serde::{Deserialize, Serialize};

use crate::types::delivery::delivery_fee;
use crate::types::id::ProductId;
use crate::types::money::Naira;
use crate::types::product::Product;

/// One product in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    #[serde(rename = "id", alias = "product_id", alias = "productId")]
    pub product_id: ProductId,
    pub name: String,
    #[serde(rename = "price")]
    pub unit_price: Naira,
    #[serde(default)]
    pub category: String,
    #[serde(default, alias = "image_url")]
    pub image: Option<String>,
    pub quantity: u32,
}

impl CartLine {
    /// A fresh line for `product` with quantity 1.
    #[must_use]
    pub fn for_product(product: &Product) -> Self {
        Self {
            product_id: product.id.clone(),
            name: product.name.clone(),
            unit_price: product.price,
            category: product.category.clone(),
            image: product.image.clone(),
            quantity: 1,
        }
    }

    #[must_use]
    pub fn line_total(&self) -> Naira {
        self.unit_price * self.quantity
    }
}

/// Ordered cart lines, unique by product id.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    #[must_use]
    pub const fn new() -> Self {
        Self { lines: Vec::new() }
    }

    /// Build a cart from stored lines, merging duplicates and dropping
    /// zero-quantity entries.
    #[must_use]
    pub fn from_lines(lines: impl IntoIterator<Item = CartLine>) -> Self {
        let mut cart = Self::new();
        for line in lines {
            if line.quantity == 0 {
                continue;
            }
            match cart.position(&line.product_id) {
                Some(i) => {
                    if let Some(existing) = cart.lines.get_mut(i) {
                        existing.quantity = existing.quantity.saturating_add(line.quantity);
                    }
                }
                None => cart.lines.push(line),
            }
        }
        cart
    }

    /// Add one unit of `product`, returning a copy of the affected line.
    pub fn add(&mut self, product: &Product) -> CartLine {
        if let Some(line) = self.lines.iter_mut().find(|l| l.product_id == product.id) {
            line.quantity = line.quantity.saturating_add(1);
            return line.clone();
        }
        let line = CartLine::for_product(product);
        self.lines.push(line.clone());
        line
    }

    /// Remove the line for `product_id`. Returns whether a line was removed.
    pub fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.lines.len();
        self.lines.retain(|line| &line.product_id != product_id);
        self.lines.len() != before
    }

    /// Set an absolute quantity; zero or less removes the line.
    ///
    /// Returns whether the cart changed.
    pub fn set_quantity(&mut self, product_id: &ProductId, quantity: i64) -> bool {
        if quantity <= 0 {
            return self.remove(product_id);
        }
        let quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        match self.lines.iter_mut().find(|l| &l.product_id == product_id) {
            Some(line) if line.quantity != quantity => {
                line.quantity = quantity;
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Take the quantities in `ordered` out of this cart.
    ///
    /// Lines whose whole quantity was ordered disappear; anything added since
    /// `ordered` was copied stays. Returns whether the cart changed.
    pub fn deduct(&mut self, ordered: &Self) -> bool {
        let mut changed = false;
        for taken in &ordered.lines {
            let Some(i) = self.position(&taken.product_id) else {
                continue;
            };
            if let Some(line) = self.lines.get_mut(i) {
                line.quantity = line.quantity.saturating_sub(taken.quantity);
                changed = true;
            }
        }
        self.lines.retain(|line| line.quantity > 0);
        changed
    }

    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    #[must_use]
    pub fn get(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.lines.iter().find(|l| &l.product_id == product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total number of units across all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines
            .iter()
            .fold(0_u32, |count, line| count.saturating_add(line.quantity))
    }

    #[must_use]
    pub fn subtotal(&self) -> Naira {
        self.lines.iter().map(CartLine::line_total).sum()
    }

    /// Price the cart for delivery to `state` / `area`.
    ///
    /// Returns `None` when the destination has no delivery fee.
    #[must_use]
    pub fn quote(&self, state: &str, area: Option<&str>) -> Option<OrderTotals> {
        let delivery = delivery_fee(state, area)?;
        let subtotal = self.subtotal();
        Some(OrderTotals {
            subtotal,
            delivery,
            total: subtotal + delivery,
        })
    }

    fn position(&self, product_id: &ProductId) -> Option<usize> {
        self.lines.iter().position(|l| &l.product_id == product_id)
    }
}

impl From<Vec<CartLine>> for Cart {
    fn from(lines: Vec<CartLine>) -> Self {
        Self::from_lines(lines)
    }
}

/// Subtotal, delivery fee and grand total of a checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Naira,
    pub delivery: Naira,
    pub total: Naira,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: ProductId::from(id),
            name: format!("Product {id}"),
            price: Naira::whole(price),
            category: "dresses".to_string(),
            size: None,
            kind: None,
            description: None,
            stock: Some(5),
            in_stock: true,
            image: Some(format!("https://cdn.example/{id}.jpg")),
        }
    }

    #[test]
    fn test_add_twice_keeps_one_line() {
        let mut cart = Cart::new();
        let p = product("p1", 25_000);
        cart.add(&p);
        let line = cart.add(&p);
        assert_eq!(line.quantity, 2);
        assert_eq!(cart.lines().len(), 1);
    }

    #[test]
    fn test_set_quantity_non_positive_removes() {
        for q in [0, -1, -40] {
            let mut cart = Cart::new();
            cart.add(&product("p1", 100));
            assert!(cart.set_quantity(&ProductId::from("p1"), q));
            assert!(cart.get(&ProductId::from("p1")).is_none());
        }
    }

    #[test]
    fn test_set_quantity_is_absolute() {
        let mut cart = Cart::new();
        cart.add(&product("p1", 100));
        cart.add(&product("p1", 100));
        assert!(cart.set_quantity(&ProductId::from("p1"), 7));
        assert_eq!(cart.get(&ProductId::from("p1")).unwrap().quantity, 7);
        assert!(!cart.set_quantity(&ProductId::from("missing"), 3));
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut cart = Cart::new();
        cart.add(&product("p1", 100));
        assert!(!cart.remove(&ProductId::from("p9")));
        assert_eq!(cart.item_count(), 1);
    }

    #[test]
    fn test_deduct_keeps_lines_added_after_the_copy() {
        let mut cart = Cart::new();
        cart.add(&product("p1", 100));
        cart.add(&product("p3", 100));
        let ordered = cart.clone();

        cart.add(&product("p1", 100));
        cart.add(&product("p2", 100));
        assert!(cart.deduct(&ordered));

        assert_eq!(cart.get(&ProductId::from("p1")).unwrap().quantity, 1);
        assert_eq!(cart.get(&ProductId::from("p2")).unwrap().quantity, 1);
        assert!(cart.get(&ProductId::from("p3")).is_none());
        assert_eq!(cart.item_count(), 2);
    }

    #[test]
    fn test_deduct_tolerates_lines_removed_meanwhile() {
        let mut cart = Cart::new();
        cart.add(&product("p1", 100));
        let ordered = cart.clone();
        cart.clear();
        assert!(!cart.deduct(&ordered));
        assert!(cart.is_empty());
    }

    #[test]
    fn test_item_count_saturates() {
        let mut cart = Cart::new();
        cart.add(&product("p1", 1));
        cart.add(&product("p2", 1));
        cart.set_quantity(&ProductId::from("p1"), i64::MAX);
        cart.set_quantity(&ProductId::from("p2"), i64::MAX);
        assert_eq!(cart.item_count(), u32::MAX);
    }

    #[test]
    fn test_lagos_checkout_quote() {
        let mut cart = Cart::new();
        cart.add(&product("p1", 25_000));
        cart.add(&product("p1", 25_000));
        cart.add(&product("p2", 10_000));

        let quote = cart.quote("Lagos", Some("Ikeja / Maryland / Anthony")).unwrap();
        assert_eq!(quote.subtotal, Naira::whole(60_000));
        assert_eq!(quote.delivery, Naira::whole(2500));
        assert_eq!(quote.total, Naira::whole(62_500));
    }

    #[test]
    fn test_stored_shape_accepts_image_url_alias() {
        let json = r#"[{"id":"p1","name":"Ankara Wrap","price":15000,"image_url":"a.jpg","quantity":2},
                      {"id":"p1","name":"Ankara Wrap","price":15000,"quantity":1}]"#;
        let lines: Vec<CartLine> = serde_json::from_str(json).unwrap();
        let cart = Cart::from_lines(lines);
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.lines()[0].image.as_deref(), Some("a.jpg"));
    }

    #[test]
    fn test_serialized_cart_reloads_in_order() {
        let mut cart = Cart::new();
        cart.add(&product("p2", 10_000));
        cart.add(&product("p1", 25_000));
        cart.set_quantity(&ProductId::from("p1"), 3);

        let json = serde_json::to_string(&cart).unwrap();
        let reloaded: Cart = serde_json::from_str(&json).unwrap();
        assert_eq!(reloaded, cart);
        assert_eq!(reloaded.lines()[0].product_id.as_str(), "p2");
    }
}
