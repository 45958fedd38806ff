//! Admin mutation surface.
//!
//! Every operation goes through an [`AdminConsole`], which can only be built
//! for a signed-in admin. Product writes are pushed to open storefronts by
//! the hosted store's realtime feed; order status changes additionally write
//! a notification for the order's owner.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use oja_core::{
    Account, NewNotification, Order, OrderId, OrderStatus, PaymentStatus, Product, ProductId,
    Role, UserId,
};
use oja_storefront::backend::{HostedStore, ProductPatch, RestClient};

use crate::error::AdminError;
use crate::form::ProductDraft;

/// Stock set by [`AdminConsole::toggle_stock`] on a sold-out product.
pub const RESTOCK_QUANTITY: u32 = 10;

/// What happened to the owner notification of a status change.
///
/// The status write and the notification write are independent; a failed
/// notification does not undo the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Sent,
    /// The status has no owner-facing message, or the order has no owner.
    Skipped,
    Failed(String),
}

/// Result of [`AdminConsole::set_order_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub notification: NotificationOutcome,
}

/// Admin operations, bound to the admin who unlocked them.
pub struct AdminConsole {
    backend: Arc<dyn HostedStore>,
    admin: Account,
    image_bucket: String,
}

impl AdminConsole {
    /// Unlock the console for the current identity.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Forbidden`] unless the identity is an admin.
    pub async fn authorize(
        backend: Arc<dyn HostedStore>,
        image_bucket: impl Into<String>,
    ) -> Result<Self, AdminError> {
        let identity = backend.current_identity().await.map_err(AdminError::backend)?;
        let Some(admin) = identity.account().filter(|a| a.role == Role::Admin).cloned() else {
            warn!(user_id = ?identity.user_id(), "Admin access denied");
            return Err(AdminError::Forbidden);
        };
        info!(user_id = %admin.id, "Admin console unlocked");
        Ok(Self {
            backend,
            admin,
            image_bucket: image_bucket.into(),
        })
    }

    /// Unlock the console for maintenance jobs holding the service key.
    ///
    /// # Errors
    ///
    /// Returns [`AdminError::Forbidden`] if the client was built without the
    /// service key.
    pub fn for_service(
        client: RestClient,
        image_bucket: impl Into<String>,
    ) -> Result<Self, AdminError> {
        if !client.is_elevated() {
            return Err(AdminError::Forbidden);
        }
        Ok(Self {
            backend: Arc::new(client),
            admin: Account {
                id: UserId::from(uuid::Uuid::nil()),
                email: None,
                full_name: Some("service".to_string()),
                role: Role::Admin,
            },
            image_bucket: image_bucket.into(),
        })
    }

    #[must_use]
    pub const fn admin(&self) -> &Account {
        &self.admin
    }

    // -------------------------------------------------------------------------
    // Products
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<Product>, AdminError> {
        self.backend.list_products().await.map_err(AdminError::backend)
    }

    /// Update the product if the draft names one, otherwise insert it.
    #[instrument(skip(self, draft), fields(product_id = ?draft.id))]
    pub async fn upsert_product(&self, draft: ProductDraft) -> Result<Product, AdminError> {
        let product = match &draft.id {
            Some(id) => self.backend.update_product(id, &draft.patch).await,
            None => self.backend.insert_product(&draft.patch).await,
        }
        .map_err(AdminError::backend)?;
        info!(product_id = %product.id, "Product saved");
        Ok(product)
    }

    /// Permanently delete a product. Callers confirm with the user first.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: &ProductId) -> Result<(), AdminError> {
        self.backend.delete_product(id).await.map_err(AdminError::backend)?;
        info!(product_id = %id, "Product deleted");
        Ok(())
    }

    /// Zero the stock of an available product, or restock a sold-out one to
    /// [`RESTOCK_QUANTITY`].
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub async fn toggle_stock(&self, product: &Product) -> Result<Product, AdminError> {
        let sold_out = product.stock.map_or(!product.in_stock, |count| count == 0);
        let stock = if sold_out { RESTOCK_QUANTITY } else { 0 };
        let patch = ProductPatch {
            stock: Some(stock),
            ..ProductPatch::default()
        };
        self.backend
            .update_product(&product.id, &patch)
            .await
            .map_err(AdminError::backend)
    }

    /// Upload an image to the product bucket and return its public URL.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub async fn upload_product_image(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<String, AdminError> {
        let path = object_name(file_name)
            .ok_or_else(|| AdminError::invalid("file_name", "has no usable characters"))?;
        self.backend
            .upload_object(&self.image_bucket, &path, bytes, content_type_for(file_name))
            .await
            .map_err(AdminError::backend)
    }

    /// Point every product whose image refers to `legacy_name` at `url`.
    ///
    /// Returns how many products were changed. Products already pointing at
    /// `url` are left alone, so running this twice changes nothing.
    pub async fn repoint_product_images(
        &self,
        legacy_name: &str,
        url: &str,
    ) -> Result<usize, AdminError> {
        let products = self.list_products().await?;
        let mut changed = 0;
        for product in products {
            let Some(image) = product.image.as_deref() else {
                continue;
            };
            if image == url || !refers_to(image, legacy_name) {
                continue;
            }
            let patch = ProductPatch {
                image_url: Some(url.to_owned()),
                ..ProductPatch::default()
            };
            self.backend
                .update_product(&product.id, &patch)
                .await
                .map_err(AdminError::backend)?;
            changed += 1;
        }
        Ok(changed)
    }

    // -------------------------------------------------------------------------
    // Orders
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<Order>, AdminError> {
        self.backend.all_orders().await.map_err(AdminError::backend)
    }

    /// Move an order to `status` and tell its owner, if it has one.
    ///
    /// # Errors
    ///
    /// Fails only if the status write fails. A failed notification write is
    /// logged and reported in [`StatusChange::notification`].
    #[instrument(skip(self))]
    pub async fn set_order_status(
        &self,
        order_id: OrderId,
        owner: Option<UserId>,
        status: OrderStatus,
    ) -> Result<StatusChange, AdminError> {
        self.backend
            .update_order_status(order_id, status)
            .await
            .map_err(AdminError::backend)?;
        info!(order_id = %order_id, status = %status, "Order status updated");

        let message = owner.and_then(|user| NewNotification::order_status(user, order_id, status));
        let notification = match message {
            None => NotificationOutcome::Skipped,
            Some(notification) => match self.backend.insert_notification(&notification).await {
                Ok(_) => NotificationOutcome::Sent,
                Err(e) => {
                    oja_storefront::error::report(&e, "Order status notification failed");
                    NotificationOutcome::Failed(e.to_string())
                }
            },
        };

        Ok(StatusChange {
            order_id,
            status,
            notification,
        })
    }

    #[instrument(skip(self))]
    pub async fn mark_paid(&self, order_id: OrderId) -> Result<(), AdminError> {
        self.backend
            .update_payment_status(order_id, PaymentStatus::Paid)
            .await
            .map_err(AdminError::backend)
    }

    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn grant_role(&self, user: UserId, role: Role) -> Result<(), AdminError> {
        self.backend.set_role(user, role).await.map_err(AdminError::backend)?;
        info!(user_id = %user, role = %role, granted_by = %self.admin.id, "Role changed");
        Ok(())
    }
}

/// Storage object name for an uploaded file: lowercase, with anything other
/// than letters, digits, `.`, `-` and `_` turned into `-`.
fn object_name(file_name: &str) -> Option<String> {
    let base = Path::new(file_name).file_name()?.to_str()?;
    let name: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let name = name.trim_matches('-');
    (!name.is_empty() && name.chars().any(|c| c.is_ascii_alphanumeric())).then(|| name.to_owned())
}

/// MIME type for an image file name.
#[must_use]
pub fn content_type_for(file_name: &str) -> &'static str {
    let extension = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("avif") => "image/avif",
        Some("svg") => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

/// Whether an image reference points at `file_name`, ignoring directories
/// and query strings.
fn refers_to(image: &str, file_name: &str) -> bool {
    let path = image.split(['?', '#']).next().unwrap_or(image);
    path.rsplit('/')
        .next()
        .is_some_and(|last| last.eq_ignore_ascii_case(file_name))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use oja_core::{
        Cart, CheckoutDetails, Email, Naira, NewOrder, NotificationKind, PaymentMethod,
    };
    use oja_storefront::backend::{FailPoint, MemoryStore};
    use secrecy::SecretString;

    use crate::form::ProductForm;

    fn product(id: &str, stock: u32) -> Product {
        Product {
            id: ProductId::from(id),
            name: format!("Item {id}"),
            price: Naira::whole(10_000),
            category: "accessories".to_string(),
            size: None,
            kind: None,
            description: None,
            stock: Some(stock),
            in_stock: stock > 0,
            image: Some(format!("/images/{id}.jpg")),
        }
    }

    async fn console(store: &Arc<MemoryStore>) -> AdminConsole {
        let email = Email::parse("admin@oja.ng").unwrap();
        store.add_account(&email, "pw", Role::Admin);
        store.sign_in(&email, &SecretString::from("pw")).await.unwrap();
        AdminConsole::authorize(store.clone(), "product-images").await.unwrap()
    }

    async fn place_order(store: &MemoryStore, owner: Option<UserId>) -> Order {
        let mut cart = Cart::new();
        cart.add(&product("p1", 3));
        let details = CheckoutDetails {
            contact_email: Email::parse("ada@example.com").unwrap(),
            contact_phone: "08012345678".to_string(),
            shipping_address: "1 Marina".to_string(),
            shipping_state: "Oyo".to_string(),
            shipping_area: None,
            payment_method: PaymentMethod::PayOnDelivery,
        };
        let totals = cart.quote("Oyo", None).unwrap();
        let order = NewOrder::from_cart(&cart, &details, totals, owner, "OJA-TEST2345".to_string());
        store.insert_order(&order).await.unwrap()
    }

    #[tokio::test]
    async fn test_members_and_guests_are_forbidden() {
        let store = Arc::new(MemoryStore::new());
        assert!(matches!(
            AdminConsole::authorize(store.clone(), "b").await,
            Err(AdminError::Forbidden)
        ));

        let email = Email::parse("ada@example.com").unwrap();
        store.add_account(&email, "pw", Role::Member);
        store.sign_in(&email, &SecretString::from("pw")).await.unwrap();
        assert!(matches!(
            AdminConsole::authorize(store, "b").await,
            Err(AdminError::Forbidden)
        ));
    }

    #[tokio::test]
    async fn test_upsert_inserts_then_updates() {
        let store = Arc::new(MemoryStore::new());
        let console = console(&store).await;

        let draft = ProductDraft::from_form(ProductForm {
            name: "Beaded Clutch".to_string(),
            price: "15,500".to_string(),
            stock: Some("4".to_string()),
            ..ProductForm::default()
        })
        .unwrap();
        let created = console.upsert_product(draft).await.unwrap();
        assert_eq!(created.price, Naira::whole(15_500));

        let draft = ProductDraft::from_form(ProductForm {
            id: Some(created.id.to_string()),
            name: "Beaded Clutch".to_string(),
            price: "14000".to_string(),
            ..ProductForm::default()
        })
        .unwrap();
        let updated = console.upsert_product(draft).await.unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.price, Naira::whole(14_000));
        assert_eq!(updated.stock, Some(4));
        assert_eq!(store.products().len(), 1);
    }

    #[tokio::test]
    async fn test_toggle_stock() {
        let store = Arc::new(MemoryStore::with_products(vec![product("p1", 3), product("p2", 0)]));
        let console = console(&store).await;

        let zeroed = console.toggle_stock(&product("p1", 3)).await.unwrap();
        assert_eq!(zeroed.stock, Some(0));
        assert!(!zeroed.in_stock);

        let restocked = console.toggle_stock(&product("p2", 0)).await.unwrap();
        assert_eq!(restocked.stock, Some(RESTOCK_QUANTITY));
        assert!(restocked.in_stock);
    }

    #[tokio::test]
    async fn test_delete_product() {
        let store = Arc::new(MemoryStore::with_products(vec![product("p1", 3)]));
        let console = console(&store).await;
        console.delete_product(&ProductId::from("p1")).await.unwrap();
        assert!(store.products().is_empty());
    }

    #[tokio::test]
    async fn test_shipped_writes_one_notification() {
        let store = Arc::new(MemoryStore::new());
        let console = console(&store).await;
        let owner = UserId::random();
        let order = place_order(&store, Some(owner)).await;

        let change = console
            .set_order_status(order.id, Some(owner), OrderStatus::Shipped)
            .await
            .unwrap();
        assert_eq!(change.notification, NotificationOutcome::Sent);

        let notifications = store.notifications();
        assert_eq!(notifications.len(), 1);
        let n = &notifications[0];
        assert_eq!(n.user_id, owner);
        assert_eq!(n.kind, NotificationKind::OrderUpdate);
        assert_eq!(n.order_id, Some(order.id));
        assert!(n.message.contains("shipped"));
        assert_eq!(store.orders()[0].status, OrderStatus::Shipped);
    }

    #[tokio::test]
    async fn test_no_notification_without_owner_or_for_pending() {
        let store = Arc::new(MemoryStore::new());
        let console = console(&store).await;
        let order = place_order(&store, None).await;

        let change = console
            .set_order_status(order.id, None, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(change.notification, NotificationOutcome::Skipped);

        let change = console
            .set_order_status(order.id, Some(UserId::random()), OrderStatus::Pending)
            .await
            .unwrap();
        assert_eq!(change.notification, NotificationOutcome::Skipped);
        assert!(store.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_failed_notification_keeps_status() {
        let store = Arc::new(MemoryStore::new());
        let console = console(&store).await;
        let owner = UserId::random();
        let order = place_order(&store, Some(owner)).await;
        store.fail(FailPoint::WriteNotifications);

        let change = console
            .set_order_status(order.id, Some(owner), OrderStatus::Processing)
            .await
            .unwrap();
        assert!(matches!(change.notification, NotificationOutcome::Failed(_)));
        assert_eq!(store.orders()[0].status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_mark_paid_and_list_orders() {
        let store = Arc::new(MemoryStore::new());
        let console = console(&store).await;
        let order = place_order(&store, None).await;

        console.mark_paid(order.id).await.unwrap();
        let orders = console.list_orders().await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].payment_status, PaymentStatus::Paid);
    }

    #[tokio::test]
    async fn test_grant_role() {
        let store = Arc::new(MemoryStore::new());
        let console = console(&store).await;
        let email = Email::parse("ada@example.com").unwrap();
        let member = store.add_account(&email, "pw", Role::Member);

        console.grant_role(member, Role::Admin).await.unwrap();
        assert_eq!(store.role(member), Some(Role::Admin));
    }

    #[tokio::test]
    async fn test_upload_and_repoint_images() {
        let store = Arc::new(MemoryStore::with_products(vec![product("p1", 3), product("p2", 3)]));
        let console = console(&store).await;

        let url = console
            .upload_product_image("uploads/P1.JPG", vec![1, 2, 3])
            .await
            .unwrap();
        assert_eq!(store.object("product-images", "p1.jpg"), Some(vec![1, 2, 3]));

        assert_eq!(console.repoint_product_images("p1.jpg", &url).await.unwrap(), 1);
        assert_eq!(console.repoint_product_images("p1.jpg", &url).await.unwrap(), 0);
        let products = store.products();
        let p1 = products.iter().find(|p| p.id.as_str() == "p1").unwrap();
        assert_eq!(p1.image.as_deref(), Some(url.as_str()));
    }

    #[test]
    fn test_object_name_and_content_type() {
        assert_eq!(object_name("My Photo (1).PNG").as_deref(), Some("my-photo--1-.png"));
        assert_eq!(object_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(object_name("???"), None);
        assert_eq!(content_type_for("a.JPeG"), "image/jpeg");
        assert_eq!(content_type_for("a.txt"), "application/octet-stream");
    }

    #[test]
    fn test_refers_to() {
        assert!(refers_to("/images/ankara.jpg", "ankara.jpg"));
        assert!(refers_to("https://cdn.example.com/x/ANKARA.jpg?v=2", "ankara.jpg"));
        assert!(!refers_to("/images/ankara-hat.jpg", "ankara.jpg"));
    }
}
