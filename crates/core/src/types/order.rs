//! Orders as stored in the hosted `orders` table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::cart::{Cart, CartLine, OrderTotals};
use crate::types::email::Email;
use crate::types::id::{OrderId, UserId};
use crate::types::money::Naira;
use crate::types::status::{OrderStatus, PaymentMethod, PaymentStatus};

/// What the buyer fills in at checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutDetails {
    pub contact_email: Email,
    pub contact_phone: String,
    pub shipping_address: String,
    pub shipping_state: String,
    /// Required for Lagos, ignored elsewhere.
    pub shipping_area: Option<String>,
    pub payment_method: PaymentMethod,
}

/// An order row.
///
/// Everything except `status` and `payment_status` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: Option<UserId>,
    pub items: Vec<CartLine>,
    pub total_amount: Naira,
    pub shipping_fee: Naira,
    pub shipping_address: String,
    pub shipping_state: String,
    #[serde(default)]
    pub shipping_area: Option<String>,
    pub contact_email: String,
    pub contact_phone: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub status: OrderStatus,
    pub tracking_code: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert payload for a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub user_id: Option<UserId>,
    pub items: Vec<CartLine>,
    pub total_amount: Naira,
    pub shipping_fee: Naira,
    pub shipping_address: String,
    pub shipping_state: String,
    pub shipping_area: Option<String>,
    pub contact_email: String,
    pub contact_phone: String,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub tracking_code: String,
}

impl NewOrder {
    /// Snapshot `cart` into a pending, unpaid order.
    #[must_use]
    pub fn from_cart(
        cart: &Cart,
        details: &CheckoutDetails,
        totals: OrderTotals,
        user_id: Option<UserId>,
        tracking_code: String,
    ) -> Self {
        Self {
            user_id,
            items: cart.lines().to_vec(),
            total_amount: totals.total,
            shipping_fee: totals.delivery,
            shipping_address: details.shipping_address.trim().to_owned(),
            shipping_state: details.shipping_state.trim().to_owned(),
            shipping_area: details.shipping_area.clone(),
            contact_email: details.contact_email.to_string(),
            contact_phone: details.contact_phone.trim().to_owned(),
            payment_method: details.payment_method,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            tracking_code,
        }
    }
}

/// Device-local record of an order placed without an account.
///
/// Guests cannot query order history, so this list is how they find their
/// tracking codes again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestOrder {
    pub tracking_code: String,
    pub order_id: OrderId,
    pub date: DateTime<Utc>,
    pub total: Naira,
    pub items: Vec<CartLine>,
}

impl From<&Order> for GuestOrder {
    fn from(order: &Order) -> Self {
        Self {
            tracking_code: order.tracking_code.clone(),
            order_id: order.id,
            date: order.created_at,
            total: order.total_amount,
            items: order.items.clone(),
        }
    }
}
