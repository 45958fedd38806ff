//! Buyer notifications written by the admin surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::id::{NotificationId, OrderId, UserId};
use crate::types::status::{NotificationKind, OrderStatus};

/// A notification row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewNotification {
    pub user_id: UserId,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub order_id: Option<OrderId>,
    pub is_read: bool,
}

impl NewNotification {
    /// The owner-facing message for an order entering `status`.
    ///
    /// Returns `None` for statuses that do not notify (`pending`).
    #[must_use]
    pub fn order_status(user_id: UserId, order_id: OrderId, status: OrderStatus) -> Option<Self> {
        let reference = order_id.short();
        let (title, message) = match status {
            OrderStatus::Pending => return None,
            OrderStatus::Processing => (
                "Order is being processed",
                format!("Your order #{reference} has been confirmed and is being prepared."),
            ),
            OrderStatus::Shipped => (
                "Order shipped",
                format!(
                    "Good news! Your order #{reference} has been shipped and is on its way to you."
                ),
            ),
            OrderStatus::Delivered => (
                "Order delivered",
                format!(
                    "Your order #{reference} has been delivered. Thank you for shopping with us!"
                ),
            ),
            OrderStatus::Cancelled => (
                "Order cancelled",
                format!(
                    "Your order #{reference} has been cancelled. Please contact support if you have any questions."
                ),
            ),
        };

        Some(Self {
            user_id,
            title: title.to_owned(),
            message,
            kind: NotificationKind::OrderUpdate,
            order_id: Some(order_id),
            is_read: false,
        })
    }
}
