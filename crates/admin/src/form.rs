//! Product form input and its coercion into a store write.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::Deserialize;

use oja_core::{Naira, ProductId};
use oja_storefront::backend::ProductPatch;

use crate::error::AdminError;

/// Raw product form as submitted; every field is text.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductForm {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub price: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub stock: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// A validated product write. No `id` means insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductDraft {
    pub id: Option<ProductId>,
    pub patch: ProductPatch,
}

impl ProductDraft {
    /// Coerce form text into typed fields.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Validation`] for a blank name, or a price or
    /// stock that is not a number or is negative.
    pub fn from_form(form: ProductForm) -> Result<Self, AdminError> {
        let name = form.name.trim();
        if name.is_empty() {
            return Err(AdminError::invalid("name", "is required"));
        }

        let price = parse_price(&form.price)?;
        let stock = form
            .stock
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_stock)
            .transpose()?;

        let id = non_empty(form.id).map(ProductId::new);
        Ok(Self {
            patch: ProductPatch {
                id: id.clone(),
                name: Some(name.to_owned()),
                price: Some(price),
                category: Some(form.category.trim().to_owned()),
                size: non_empty(form.size),
                kind: non_empty(form.kind),
                description: non_empty(form.description),
                stock,
                image_url: non_empty(form.image_url),
            },
            id,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Accepts `25000`, `25,000`, `₦25,000` and `25000.50`.
fn parse_price(raw: &str) -> Result<Naira, AdminError> {
    let cleaned = raw.trim().trim_start_matches('₦').replace(',', "");
    let amount = Decimal::from_str(cleaned.trim())
        .map_err(|_| AdminError::invalid("price", format!("'{}' is not a number", raw.trim())))?;
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(AdminError::invalid("price", "must not be negative"));
    }
    Ok(Naira::new(amount))
}

fn parse_stock(raw: &str) -> Result<u32, AdminError> {
    let count = raw
        .parse::<i64>()
        .map_err(|_| AdminError::invalid("stock", format!("'{raw}' is not a whole number")))?;
    if count < 0 {
        return Err(AdminError::invalid("stock", "must not be negative"));
    }
    u32::try_from(count).map_err(|_| AdminError::invalid("stock", "is too large"))
}
