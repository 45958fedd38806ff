//! Cart and order state for one buyer session.
//!
//! [`CartStore`] is the single source of truth for what is in the bag and
//! which orders and notifications belong to the current identity. It keeps
//! that state consistent across reloads (device storage), identity changes
//! (auth events) and other tabs or devices (realtime feed).
//!
//! Cart mutations are synchronous. Each one, once [`CartStore::initialize`]
//! has completed, is written to device storage before returning and to the
//! account's profile row by a detached task whose failure is only logged.

mod inbox;

pub use inbox::Inbox;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use oja_core::{
    Cart, CartLine, CheckoutDetails, GuestOrder, Identity, NewOrder, Notification, NotificationId,
    Order, Product, ProductId, UserId,
};

use crate::backend::{AuthEvent, CartSnapshot, HostedStore, Topic};
use crate::error::{CheckoutError, add_breadcrumb, clear_sentry_user, report, set_sentry_user};
use crate::storage::{DeviceStorage, DeviceStorageExt, keys};
use crate::tracking::{LastOrder, generate_tracking_code};
use inbox::AccountData;

/// How long [`CartStore::last_added`] keeps reporting an added line.
pub const TOAST_DURATION: Duration = Duration::from_secs(3);

/// Notifications fetched when an account is loaded.
pub const NOTIFICATION_PAGE: usize = 50;

/// Something the UI may want to react to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A product was added; drives the "added to bag" toast.
    ItemAdded(CartLine),
    CartChanged,
    OrderPlaced(Order),
    /// One of the account's orders changed, usually its status.
    OrderUpdated(Order),
    NotificationReceived(Notification),
    SignedOut,
}

#[derive(Debug, Default)]
struct Session {
    cart: Cart,
    identity: Identity,
    last_added: Option<(CartLine, Instant)>,
}

/// Sets the initialized flag when dropped, however hydration ended.
struct InitializedOnDrop<'a>(&'a AtomicBool);

impl Drop for InitializedOnDrop<'_> {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Cart, orders and notifications of the current buyer.
pub struct CartStore {
    backend: Arc<dyn HostedStore>,
    storage: Arc<dyn DeviceStorage>,
    session: Mutex<Session>,
    account: Arc<Mutex<AccountData>>,
    initializing: AtomicBool,
    initialized: AtomicBool,
    /// Version of the most recently persisted cart.
    version: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl CartStore {
    #[must_use]
    pub fn new(backend: Arc<dyn HostedStore>, storage: Arc<dyn DeviceStorage>) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            backend,
            storage,
            session: Mutex::new(Session::default()),
            account: Arc::new(Mutex::new(AccountData::default())),
            initializing: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            version: AtomicU64::new(0),
            events,
            listener: Mutex::new(None),
        }
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn account(&self) -> MutexGuard<'_, AccountData> {
        self.account.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listener(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -------------------------------------------------------------------------
    // Startup
    // -------------------------------------------------------------------------

    /// Restore state for this device and identity.
    ///
    /// Reads the device cart, resolves the identity and, for a signed-in
    /// account, loads its saved cart, orders and notifications and starts the
    /// realtime listener. Failures degrade to empty state and are logged.
    /// Only the first call does any work.
    #[instrument(skip(self))]
    pub async fn initialize(&self) {
        if self.initializing.swap(true, Ordering::AcqRel) {
            return;
        }
        let _done = InitializedOnDrop(&self.initialized);

        let local = self
            .storage
            .load::<CartSnapshot>(keys::CART)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Device cart is unreadable, starting empty");
                None
            });
        if let Some(snapshot) = &local {
            self.version.fetch_max(snapshot.version, Ordering::AcqRel);
        }

        let identity = self.backend.current_identity().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not resolve identity, continuing as guest");
            Identity::Guest
        });

        {
            let mut session = self.session();
            if let Some(snapshot) = local {
                session.cart = snapshot.into_cart();
            }
            session.identity = identity.clone();
        }

        if let Some(account) = identity.account() {
            set_sentry_user(&account.id, account.email.as_deref());
            self.load_account(account.id).await;
        }

        debug!(items = self.session().cart.item_count(), "Cart store initialized");
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Load server cart, orders and notifications for `user`.
    async fn load_account(&self, user: UserId) {
        let local_version = self.version.load(Ordering::Acquire);
        match self.backend.load_cart(user).await {
            Ok(Some(server)) if !server.is_empty() => {
                if server.version < local_version {
                    warn!(
                        server_version = server.version,
                        local_version,
                        "Saved cart is older than this device's cart"
                    );
                }
                self.version.fetch_max(server.version, Ordering::AcqRel);
                if let Err(e) = self.storage.save(keys::CART, &server) {
                    warn!(error = %e, "Could not write saved cart to device");
                }
                self.session().cart = server.into_cart();
                let _ = self.events.send(StoreEvent::CartChanged);
            }
            Ok(_) => {
                // Nothing saved yet; the device cart becomes the account's.
                let cart = self.session().cart.clone();
                if !cart.is_empty() {
                    self.persist(&cart, Some(user));
                }
            }
            Err(e) => warn!(error = %e, "Could not load saved cart, keeping device cart"),
        }

        self.start_listener(user);

        let orders = self.backend.orders_for_user(user).await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not load order history");
            Vec::new()
        });
        let notifications = self
            .backend
            .notifications_for_user(user, NOTIFICATION_PAGE)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Could not load notifications");
                Vec::new()
            });

        let mut account = self.account();
        account.orders = orders;
        // The listener may already have delivered some of these.
        account.inbox.merge(notifications);
    }

    fn start_listener(&self, user: UserId) {
        let mut subscription = self.backend.subscribe(Topic::Account(user));
        let account = Arc::clone(&self.account);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                let outcome = account
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .apply(event);
                if let Some(outcome) = outcome {
                    let _ = events.send(outcome);
                }
            }
        });
        if let Some(previous) = self.listener().replace(handle) {
            previous.abort();
        }
    }

    fn stop_listener(&self) {
        if let Some(handle) = self.listener().take() {
            handle.abort();
        }
    }

    // -------------------------------------------------------------------------
    // Identity changes
    // -------------------------------------------------------------------------

    /// React to a sign-in or sign-out.
    pub async fn handle_auth_event(&self, event: AuthEvent) {
        match event {
            AuthEvent::SignedOut => self.reset(),
            AuthEvent::SignedIn(identity) => {
                self.session().identity = identity.clone();
                if let Some(account) = identity.account() {
                    info!(user_id = %account.id, "Signed in");
                    set_sentry_user(&account.id, account.email.as_deref());
                    self.account().clear();
                    self.load_account(account.id).await;
                }
            }
        }
    }

    /// Follow the backend's auth events until the store is dropped.
    pub fn watch_auth(self: &Arc<Self>) -> JoinHandle<()> {
        let mut auth = self.backend.auth_events();
        let store = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let event = match auth.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Missed auth events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(store) = store.upgrade() else {
                    break;
                };
                store.handle_auth_event(event).await;
            }
        })
    }

    /// Forget everything tied to the previous identity, on this device too.
    fn reset(&self) {
        self.stop_listener();
        *self.session() = Session::default();
        self.account().clear();
        if let Err(e) = self.storage.remove(keys::CART) {
            warn!(error = %e, "Could not remove device cart");
        }
        clear_sentry_user();
        info!("Signed out, session state cleared");
        let _ = self.events.send(StoreEvent::SignedOut);
    }

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    /// Add one unit of `product`, returning the resulting line.
    pub fn add_to_cart(&self, product: &Product) -> CartLine {
        let (line, cart, user) = {
            let mut session = self.session();
            let line = session.cart.add(product);
            session.last_added = Some((line.clone(), Instant::now()));
            (line, session.cart.clone(), session.identity.user_id())
        };

        add_breadcrumb(
            "cart",
            "Added to cart",
            &[
                ("product_id", line.product_id.as_str()),
                ("quantity", &line.quantity.to_string()),
            ],
        );
        self.changed(&cart, user);
        let _ = self.events.send(StoreEvent::ItemAdded(line.clone()));
        line
    }

    /// The line most recently added, for at most [`TOAST_DURATION`].
    #[must_use]
    pub fn last_added(&self) -> Option<CartLine> {
        self.session()
            .last_added
            .as_ref()
            .filter(|(_, at)| at.elapsed() < TOAST_DURATION)
            .map(|(line, _)| line.clone())
    }

    /// Remove a product's line. Removing an absent product does nothing.
    pub fn remove_from_cart(&self, product_id: &ProductId) -> bool {
        self.mutate(|cart| cart.remove(product_id))
    }

    /// Set a line's quantity exactly; zero or less removes it.
    pub fn update_quantity(&self, product_id: &ProductId, quantity: i64) -> bool {
        self.mutate(|cart| cart.set_quantity(product_id, quantity))
    }

    pub fn clear_cart(&self) {
        self.mutate(|cart| {
            let had_lines = !cart.is_empty();
            cart.clear();
            had_lines
        });
    }

    fn mutate(&self, change: impl FnOnce(&mut Cart) -> bool) -> bool {
        let (changed, cart, user) = {
            let mut session = self.session();
            let changed = change(&mut session.cart);
            (changed, session.cart.clone(), session.identity.user_id())
        };
        if changed {
            self.changed(&cart, user);
        }
        changed
    }

    fn changed(&self, cart: &Cart, user: Option<UserId>) {
        if self.is_initialized() {
            self.persist(cart, user);
        }
        let _ = self.events.send(StoreEvent::CartChanged);
    }

    /// Mirror the cart to the device now and to the account in the background.
    fn persist(&self, cart: &Cart, user: Option<UserId>) {
        let version = self.version.fetch_add(1, Ordering::AcqRel) + 1;
        let snapshot = CartSnapshot::new(version, cart);

        if let Err(e) = self.storage.save(keys::CART, &snapshot) {
            warn!(error = %e, "Could not write device cart");
        }

        let Some(user) = user else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let backend = Arc::clone(&self.backend);
                runtime.spawn(async move {
                    if let Err(e) = backend.save_cart(user, &snapshot).await {
                        warn!(error = %e, version, "Could not save cart to account");
                    }
                });
            }
            Err(_) => warn!(version, "No async runtime, cart not saved to account"),
        }
    }

    // -------------------------------------------------------------------------
    // Checkout
    // -------------------------------------------------------------------------

    /// Turn the current cart into an order.
    ///
    /// On success the ordered quantities leave the cart and the order is
    /// either added to the account's history or, for guests, to this device's
    /// guest order list.
    /// On failure nothing changes and the error is returned for the buyer.
    #[instrument(skip(self, details), fields(state = %details.shipping_state))]
    pub async fn place_order(&self, details: CheckoutDetails) -> Result<Order, CheckoutError> {
        let (cart, known_identity) = {
            let session = self.session();
            (session.cart.clone(), session.identity.clone())
        };
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let totals = cart
            .quote(&details.shipping_state, details.shipping_area.as_deref())
            .ok_or_else(|| CheckoutError::UnknownDeliveryArea {
                state: details.shipping_state.clone(),
                area: details.shipping_area.clone(),
            })?;

        let identity = self.backend.current_identity().await.unwrap_or_else(|e| {
            warn!(error = %e, "Could not re-check identity, using session identity");
            known_identity
        });

        let new_order = NewOrder::from_cart(
            &cart,
            &details,
            totals,
            identity.user_id(),
            generate_tracking_code(),
        );
        let order = self.backend.insert_order(&new_order).await.map_err(|e| {
            report(&e, "Order submission failed");
            CheckoutError::Submit(e)
        })?;

        match identity.user_id() {
            Some(user) => self.refresh_orders(user).await,
            None => self.remember_guest_order(&order),
        }

        let last = LastOrder {
            order_id: order.id,
            tracking_code: order.tracking_code.clone(),
        };
        if let Err(e) = self.storage.save(keys::LAST_ORDER, &last) {
            warn!(error = %e, "Could not record last order");
        }

        // Lines added while the insert was in flight were not ordered.
        self.mutate(|live| live.deduct(&cart));
        info!(
            order_id = %order.id,
            tracking_code = %order.tracking_code,
            total = %order.total_amount,
            "Order placed"
        );
        let _ = self.events.send(StoreEvent::OrderPlaced(order.clone()));
        Ok(order)
    }

    async fn refresh_orders(&self, user: UserId) {
        match self.backend.orders_for_user(user).await {
            Ok(orders) => self.account().orders = orders,
            Err(e) => warn!(error = %e, "Could not refresh order history"),
        }
    }

    fn remember_guest_order(&self, order: &Order) {
        let mut guest_orders = self
            .storage
            .load::<Vec<GuestOrder>>(keys::GUEST_ORDERS)
            .unwrap_or_else(|e| {
                warn!(error = %e, "Guest order list is unreadable, starting a new one");
                None
            })
            .unwrap_or_default();
        guest_orders.push(GuestOrder::from(order));
        if let Err(e) = self.storage.save(keys::GUEST_ORDERS, &guest_orders) {
            warn!(error = %e, "Could not record guest order");
        }
    }

    // -------------------------------------------------------------------------
    // Notifications
    // -------------------------------------------------------------------------

    /// Mark one notification read, here and in the store.
    pub async fn mark_read(&self, id: NotificationId) -> bool {
        if !self.account().inbox.mark_read(id) {
            return false;
        }
        if let Err(e) = self.backend.mark_notification_read(id).await {
            warn!(error = %e, notification_id = %id, "Could not save read state");
        }
        true
    }

    /// Mark every held notification read, here and in the store.
    pub async fn mark_all_read(&self) -> usize {
        let Some(user) = self.session().identity.user_id() else {
            return 0;
        };
        let flipped = self.account().inbox.mark_all_read();
        if flipped == 0 {
            return 0;
        }
        if let Err(e) = self.backend.mark_all_notifications_read(user).await {
            warn!(error = %e, "Could not save read state");
        }
        flipped
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn cart(&self) -> Cart {
        self.session().cart.clone()
    }

    #[must_use]
    pub fn identity(&self) -> Identity {
        self.session().identity.clone()
    }

    #[must_use]
    pub fn orders(&self) -> Vec<Order> {
        self.account().orders.clone()
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.account().inbox.notifications().to_vec()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.account().inbox.unread_count()
    }

    /// Receive [`StoreEvent`]s from now on.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl Drop for CartStore {
    fn drop(&mut self) {
        self.stop_listener();
    }
}
