//! Hosted backend access.
//!
//! # Architecture
//!
//! - [`HostedStore`] is the only seam between buyer/admin logic and the
//!   hosted platform (auth, tables, object storage, realtime)
//! - [`RestClient`] talks to the platform over its REST conventions
//! - [`MemoryStore`] keeps everything in process for tests and demos
//! - Rows are normalized into `oja_core` types in [`rows`] before anything
//!   else sees them
//!
//! # Realtime
//!
//! Row changes are delivered as [`ChangeEvent`]s through a [`Subscription`].
//! Dropping the subscription stops whatever task feeds it.

mod memory;
mod realtime;
mod rest;
pub mod rows;

pub use memory::{FailPoint, MemoryStore};
pub use rest::RestClient;
pub use rows::{CartSnapshot, ProductPatch, ProductRecord};

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;

use oja_core::{
    Email, Identity, NewNotification, NewOrder, Notification, NotificationId, Order, OrderId,
    OrderStatus, PaymentStatus, Product, ProductId, Role, UserId,
};

/// Errors that can occur when talking to the hosted backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A request URL could not be built.
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing or rejected credentials.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Rate limited by the platform.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The backend cannot be reached at all.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// What a realtime subscription listens to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Updates to any product row.
    Products,
    /// Notification inserts and order updates owned by one account.
    Account(UserId),
    /// Every order change, for the admin surface.
    AllOrders,
}

/// A pushed row change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    ProductUpdated(Product),
    OrderUpdated(Order),
    NotificationInserted(Notification),
}

impl ChangeEvent {
    /// Whether a subscriber to `topic` should see this event.
    #[must_use]
    pub fn concerns(&self, topic: Topic) -> bool {
        match (self, topic) {
            (Self::ProductUpdated(_), Topic::Products)
            | (Self::OrderUpdated(_), Topic::AllOrders) => true,
            (Self::OrderUpdated(order), Topic::Account(user)) => order.user_id == Some(user),
            (Self::NotificationInserted(n), Topic::Account(user)) => n.user_id == user,
            _ => false,
        }
    }
}

/// Session changes announced by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Identity),
    SignedOut,
}

/// A live feed of [`ChangeEvent`]s for one [`Topic`].
///
/// Dropping the subscription aborts the task feeding it, if any.
pub struct Subscription {
    topic: Topic,
    receiver: broadcast::Receiver<ChangeEvent>,
    feeder: Option<AbortHandle>,
}

impl Subscription {
    pub(crate) const fn new(
        topic: Topic,
        receiver: broadcast::Receiver<ChangeEvent>,
        feeder: Option<AbortHandle>,
    ) -> Self {
        Self {
            topic,
            receiver,
            feeder,
        }
    }

    #[must_use]
    pub const fn topic(&self) -> Topic {
        self.topic
    }

    /// Wait for the next event on this topic.
    ///
    /// Returns `None` once the backend side of the channel is gone. Events
    /// missed because the receiver lagged are logged and skipped.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.concerns(self.topic) => return Some(event),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(topic = ?self.topic, missed, "Realtime subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("topic", &self.topic)
            .field("fed", &self.feeder.is_some())
            .finish()
    }
}

/// Everything the storefront and admin surface need from the hosted platform.
///
/// Implementations must be cheap to share behind an `Arc`.
#[async_trait]
pub trait HostedStore: Send + Sync {
    // -------------------------------------------------------------------------
    // Auth
    // -------------------------------------------------------------------------

    /// Resolve who the current session belongs to. No session is a guest.
    async fn current_identity(&self) -> Result<Identity, BackendError>;

    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent>;

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    async fn list_products(&self) -> Result<Vec<Product>, BackendError>;

    async fn insert_product(&self, product: &ProductPatch) -> Result<Product, BackendError>;

    async fn update_product(
        &self,
        id: &ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, BackendError>;

    async fn delete_product(&self, id: &ProductId) -> Result<(), BackendError>;

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    /// Insert an order and read the stored row back.
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, BackendError>;

    /// Orders owned by `user`, newest first.
    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>, BackendError>;

    /// Every order, newest first.
    async fn all_orders(&self) -> Result<Vec<Order>, BackendError>;

    async fn order_by_tracking_code(&self, code: &str) -> Result<Option<Order>, BackendError>;

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), BackendError>;

    async fn update_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), BackendError>;

    // -------------------------------------------------------------------------
    // Profiles
    // -------------------------------------------------------------------------

    /// The cart stored on the account's profile. A missing profile row or an
    /// empty cart column is `Ok(None)`.
    async fn load_cart(&self, user: UserId) -> Result<Option<CartSnapshot>, BackendError>;

    async fn save_cart(&self, user: UserId, cart: &CartSnapshot) -> Result<(), BackendError>;

    async fn set_role(&self, user: UserId, role: Role) -> Result<(), BackendError>;

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Most recent notifications for `user`, newest first.
    async fn notifications_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<Notification>, BackendError>;

    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, BackendError>;

    async fn mark_notification_read(&self, id: NotificationId) -> Result<(), BackendError>;

    async fn mark_all_notifications_read(&self, user: UserId) -> Result<(), BackendError>;

    // -------------------------------------------------------------------------
    // Object storage
    // -------------------------------------------------------------------------

    /// Upload (or overwrite) an object and return its public URL.
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError>;

    // -------------------------------------------------------------------------
    // Realtime
    // -------------------------------------------------------------------------

    fn subscribe(&self, topic: Topic) -> Subscription;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Api {
            status: 409,
            message: "duplicate key".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 409 - duplicate key");
        assert_eq!(
            BackendError::RateLimited(30).to_string(),
            "Rate limited, retry after 30 seconds"
        );
    }
}
