//! In-process [`HostedStore`] for tests and offline demos.
//!
//! Behaves like the hosted tables closely enough for the storefront: writes
//! emit the same realtime events, a missing profile row silently absorbs cart
//! writes, and individual operations can be made to fail on demand.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;

use oja_core::{
    Account, Email, Identity, NewNotification, NewOrder, Notification, NotificationId, Order,
    OrderId, OrderStatus, PaymentStatus, Product, ProductId, Role, UserId,
};

use super::rows::{CartSnapshot, ProductPatch};
use super::{AuthEvent, BackendError, ChangeEvent, HostedStore, Subscription, Topic};

/// Operations that can be forced to fail with [`MemoryStore::fail`] or
/// slowed down with [`MemoryStore::delay`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CurrentIdentity,
    ListProducts,
    WriteProducts,
    InsertOrder,
    ReadOrders,
    UpdateOrders,
    LoadCart,
    SaveCart,
    ReadNotifications,
    WriteNotifications,
    Upload,
}

#[derive(Default)]
struct MemoryState {
    products: Vec<Product>,
    orders: Vec<Order>,
    profiles: HashMap<UserId, Profile>,
    notifications: Vec<Notification>,
    objects: HashMap<String, Vec<u8>>,
    session: Option<UserId>,
    failing: HashSet<FailPoint>,
    delays: HashMap<FailPoint, Duration>,
    next_product: u64,
}

struct Profile {
    email: Email,
    password: SecretString,
    full_name: Option<String>,
    role: Role,
    cart: Option<CartSnapshot>,
}

/// In-memory hosted store.
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    hub: broadcast::Sender<ChangeEvent>,
    auth_events: broadcast::Sender<AuthEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (hub, _) = broadcast::channel(256);
        let (auth_events, _) = broadcast::channel(16);
        Self {
            state: Mutex::new(MemoryState::default()),
            hub,
            auth_events,
        }
    }

    #[must_use]
    pub fn with_products(products: Vec<Product>) -> Self {
        let store = Self::new();
        store.state().products = products;
        store
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn check(&self, op: FailPoint) -> Result<(), BackendError> {
        let delay = self.state().delays.get(&op).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state().failing.contains(&op) {
            return Err(BackendError::Unavailable(format!("{op:?} is failing")));
        }
        Ok(())
    }

    fn emit(&self, event: ChangeEvent) {
        let _ = self.hub.send(event);
    }

    /// Register an account with a profile row.
    pub fn add_account(&self, email: &Email, password: &str, role: Role) -> UserId {
        let id = UserId::random();
        self.state().profiles.insert(
            id,
            Profile {
                email: email.clone(),
                password: SecretString::from(password.to_owned()),
                full_name: None,
                role,
                cart: None,
            },
        );
        id
    }

    /// Drop an account's profile row, as if it was never created.
    pub fn remove_profile(&self, user: UserId) {
        self.state().profiles.remove(&user);
    }

    /// Make `op` fail until [`MemoryStore::recover`] is called.
    pub fn fail(&self, op: FailPoint) {
        self.state().failing.insert(op);
    }

    pub fn recover(&self, op: FailPoint) {
        self.state().failing.remove(&op);
    }

    /// Make `op` wait `delay` before answering.
    pub fn delay(&self, op: FailPoint, delay: Duration) {
        self.state().delays.insert(op, delay);
    }

    /// Push a realtime event as if another client had written it.
    pub fn push(&self, event: ChangeEvent) {
        self.emit(event);
    }

    /// Put a cart on a profile directly, bypassing the client.
    pub fn set_saved_cart(&self, user: UserId, cart: CartSnapshot) {
        if let Some(profile) = self.state().profiles.get_mut(&user) {
            profile.cart = Some(cart);
        }
    }

    #[must_use]
    pub fn saved_cart(&self, user: UserId) -> Option<CartSnapshot> {
        self.state()
            .profiles
            .get(&user)
            .and_then(|p| p.cart.clone())
    }

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.state().orders.clone()
    }

    #[must_use]
    pub fn products(&self) -> Vec<Product> {
        self.state().products.clone()
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.state().notifications.clone()
    }

    #[must_use]
    pub fn role(&self, user: UserId) -> Option<Role> {
        self.state().profiles.get(&user).map(|p| p.role)
    }

    #[must_use]
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.state().objects.get(&format!("{bucket}/{path}")).cloned()
    }

    fn identity_of(state: &MemoryState, user: UserId) -> Identity {
        state.profiles.get(&user).map_or(
            Identity::Authenticated(Account {
                id: user,
                email: None,
                full_name: None,
                role: Role::Member,
            }),
            |profile| {
                Identity::Authenticated(Account {
                    id: user,
                    email: Some(profile.email.to_string()),
                    full_name: profile.full_name.clone(),
                    role: profile.role,
                })
            },
        )
    }

    fn update_order<F>(&self, id: OrderId, change: F) -> Result<(), BackendError>
    where
        F: FnOnce(&mut Order),
    {
        let updated = {
            let mut state = self.state();
            let order = state
                .orders
                .iter_mut()
                .find(|o| o.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("order {id}")))?;
            change(order);
            order.updated_at = Some(Utc::now());
            order.clone()
        };
        self.emit(ChangeEvent::OrderUpdated(updated));
        Ok(())
    }
}

fn newest_first<T, F: Fn(&T) -> chrono::DateTime<Utc>>(mut rows: Vec<T>, key: F) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
    rows
}

#[async_trait]
impl HostedStore for MemoryStore {
    async fn current_identity(&self) -> Result<Identity, BackendError> {
        self.check(FailPoint::CurrentIdentity).await?;
        let state = self.state();
        Ok(state
            .session
            .map_or(Identity::Guest, |user| Self::identity_of(&state, user)))
    }

    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, BackendError> {
        let identity = {
            let mut state = self.state();
            let user = state
                .profiles
                .iter()
                .find(|(_, p)| {
                    &p.email == email && p.password.expose_secret() == password.expose_secret()
                })
                .map(|(id, _)| *id)
                .ok_or_else(|| BackendError::Unauthorized("invalid credentials".to_string()))?;
            state.session = Some(user);
            Self::identity_of(&state, user)
        };
        let _ = self.auth_events.send(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.state().session = None;
        let _ = self.auth_events.send(AuthEvent::SignedOut);
        Ok(())
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.auth_events.subscribe()
    }

    async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        self.check(FailPoint::ListProducts).await?;
        Ok(self.state().products.clone())
    }

    async fn insert_product(&self, product: &ProductPatch) -> Result<Product, BackendError> {
        self.check(FailPoint::WriteProducts).await?;
        let mut state = self.state();
        state.next_product += 1;
        let id = product
            .id
            .clone()
            .unwrap_or_else(|| ProductId::new(format!("mem-{}", state.next_product)));
        let mut created = Product {
            id,
            name: String::new(),
            price: oja_core::Naira::ZERO,
            category: String::new(),
            size: None,
            kind: None,
            description: None,
            stock: Some(0),
            in_stock: false,
            image: None,
        };
        product.apply_to(&mut created);
        state.products.push(created.clone());
        Ok(created)
    }

    async fn update_product(
        &self,
        id: &ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, BackendError> {
        self.check(FailPoint::WriteProducts).await?;
        let updated = {
            let mut state = self.state();
            let product = state
                .products
                .iter_mut()
                .find(|p| &p.id == id)
                .ok_or_else(|| BackendError::NotFound(format!("product {id}")))?;
            patch.apply_to(product);
            product.clone()
        };
        self.emit(ChangeEvent::ProductUpdated(updated.clone()));
        Ok(updated)
    }

    async fn delete_product(&self, id: &ProductId) -> Result<(), BackendError> {
        self.check(FailPoint::WriteProducts).await?;
        self.state().products.retain(|p| &p.id != id);
        Ok(())
    }

    async fn insert_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
        self.check(FailPoint::InsertOrder).await?;
        let created = Order {
            id: OrderId::random(),
            user_id: order.user_id,
            items: order.items.clone(),
            total_amount: order.total_amount,
            shipping_fee: order.shipping_fee,
            shipping_address: order.shipping_address.clone(),
            shipping_state: order.shipping_state.clone(),
            shipping_area: order.shipping_area.clone(),
            contact_email: order.contact_email.clone(),
            contact_phone: order.contact_phone.clone(),
            payment_method: order.payment_method,
            payment_status: order.payment_status,
            status: order.status,
            tracking_code: order.tracking_code.clone(),
            created_at: Utc::now(),
            updated_at: None,
        };
        self.state().orders.push(created.clone());
        Ok(created)
    }

    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>, BackendError> {
        self.check(FailPoint::ReadOrders).await?;
        let rows = self
            .state()
            .orders
            .iter()
            .filter(|o| o.user_id == Some(user))
            .cloned()
            .collect();
        Ok(newest_first(rows, |o: &Order| o.created_at))
    }

    async fn all_orders(&self) -> Result<Vec<Order>, BackendError> {
        self.check(FailPoint::ReadOrders).await?;
        let rows = self.state().orders.clone();
        Ok(newest_first(rows, |o: &Order| o.created_at))
    }

    async fn order_by_tracking_code(&self, code: &str) -> Result<Option<Order>, BackendError> {
        self.check(FailPoint::ReadOrders).await?;
        Ok(self
            .state()
            .orders
            .iter()
            .find(|o| o.tracking_code == code)
            .cloned())
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), BackendError> {
        self.check(FailPoint::UpdateOrders).await?;
        self.update_order(id, |order| order.status = status)
    }

    async fn update_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), BackendError> {
        self.check(FailPoint::UpdateOrders).await?;
        self.update_order(id, |order| order.payment_status = status)
    }

    async fn load_cart(&self, user: UserId) -> Result<Option<CartSnapshot>, BackendError> {
        self.check(FailPoint::LoadCart).await?;
        Ok(self.saved_cart(user).filter(|cart| !cart.is_empty()))
    }

    async fn save_cart(&self, user: UserId, cart: &CartSnapshot) -> Result<(), BackendError> {
        self.check(FailPoint::SaveCart).await?;
        if let Some(profile) = self.state().profiles.get_mut(&user) {
            profile.cart = Some(cart.clone());
        }
        Ok(())
    }

    async fn set_role(&self, user: UserId, role: Role) -> Result<(), BackendError> {
        let mut state = self.state();
        let profile = state
            .profiles
            .get_mut(&user)
            .ok_or_else(|| BackendError::NotFound(format!("profile {user}")))?;
        profile.role = role;
        Ok(())
    }

    async fn notifications_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<Notification>, BackendError> {
        self.check(FailPoint::ReadNotifications).await?;
        let rows = self
            .state()
            .notifications
            .iter()
            .filter(|n| n.user_id == user)
            .cloned()
            .collect();
        let mut rows = newest_first(rows, |n: &Notification| n.created_at);
        rows.truncate(limit);
        Ok(rows)
    }

    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, BackendError> {
        self.check(FailPoint::WriteNotifications).await?;
        let created = Notification {
            id: NotificationId::random(),
            user_id: notification.user_id,
            title: notification.title.clone(),
            message: notification.message.clone(),
            kind: notification.kind,
            order_id: notification.order_id,
            is_read: notification.is_read,
            created_at: Utc::now(),
        };
        self.state().notifications.push(created.clone());
        self.emit(ChangeEvent::NotificationInserted(created.clone()));
        Ok(created)
    }

    async fn mark_notification_read(&self, id: NotificationId) -> Result<(), BackendError> {
        self.check(FailPoint::WriteNotifications).await?;
        for n in self.state().notifications.iter_mut().filter(|n| n.id == id) {
            n.is_read = true;
        }
        Ok(())
    }

    async fn mark_all_notifications_read(&self, user: UserId) -> Result<(), BackendError> {
        self.check(FailPoint::WriteNotifications).await?;
        for n in self
            .state()
            .notifications
            .iter_mut()
            .filter(|n| n.user_id == user)
        {
            n.is_read = true;
        }
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<String, BackendError> {
        self.check(FailPoint::Upload).await?;
        let key = format!("{bucket}/{}", path.trim_start_matches('/'));
        let url = format!("memory://{key}");
        self.state().objects.insert(key, bytes);
        Ok(url)
    }

    fn subscribe(&self, topic: Topic) -> Subscription {
        Subscription::new(topic, self.hub.subscribe(), None)
    }
}
