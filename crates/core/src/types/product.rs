//! Canonical product shape used everywhere past the ingestion boundary.

use serde::{Deserialize, Serialize};

use crate::types::id::ProductId;
use crate::types::money::Naira;

/// A sellable product.
///
/// Rows from the hosted store and the bundled catalog snapshot disagree on
/// field names; both are mapped into this one type before any logic runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Naira,
    pub category: String,
    pub size: Option<String>,
    /// Product type, e.g. `dress` or `two-piece`.
    pub kind: Option<String>,
    pub description: Option<String>,
    /// Units on hand, when the source reports a count.
    pub stock: Option<u32>,
    pub in_stock: bool,
    pub image: Option<String>,
}

impl Product {
    /// Apply a new stock count, keeping availability in step with it.
    pub fn set_stock(&mut self, stock: u32) {
        self.stock = Some(stock);
        self.in_stock = stock > 0;
    }
}
