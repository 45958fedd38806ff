//! REST client for the hosted platform.
//!
//! Tables are reached through `/rest/v1/<table>` with `column=eq.value`
//! filters, auth through `/auth/v1`, and object storage through
//! `/storage/v1/object`. Every request carries the public `apikey` header and
//! a bearer token: the signed-in user's access token, the service key when
//! running elevated, or the public key otherwise.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::{debug, instrument};
use url::Url;

use oja_core::{
    Account, Email, Identity, NewNotification, NewOrder, Notification, NotificationId, Order,
    OrderId, OrderStatus, PaymentStatus, Product, ProductId, Role, UserId,
};

use super::realtime;
use super::rows::{CartSnapshot, ProductPatch, ProductRecord, ProfileRow};
use super::{AuthEvent, BackendError, ChangeEvent, HostedStore, Subscription, Topic};
use crate::config::BackendConfig;

const EVENT_CAPACITY: usize = 256;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the hosted platform's REST endpoints.
///
/// Cheap to clone; clones share the session and the realtime hub.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    http: reqwest::Client,
    base: Url,
    anon_key: SecretString,
    service_key: Option<SecretString>,
    session: RwLock<Option<AuthSession>>,
    auth_events: broadcast::Sender<AuthEvent>,
    hub: broadcast::Sender<ChangeEvent>,
    poll_every: Duration,
}

struct AuthSession {
    access_token: SecretString,
    user_id: UserId,
    email: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: UserId,
    #[serde(default)]
    email: Option<String>,
}

impl RestClient {
    /// Create a client acting with the public key (and, after sign-in, the
    /// user's session).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        Self::build(config, None)
    }

    /// Create a client that authorizes every request with the service key.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::Unauthorized` if no service key is configured.
    pub fn elevated(config: &BackendConfig) -> Result<Self, BackendError> {
        let key = config.service_key.clone().ok_or_else(|| {
            BackendError::Unauthorized("OJA_BACKEND_SERVICE_KEY is not set".to_string())
        })?;
        Self::build(config, Some(key))
    }

    /// Whether requests carry the service key.
    #[must_use]
    pub fn is_elevated(&self) -> bool {
        self.inner.service_key.is_some()
    }

    fn build(
        config: &BackendConfig,
        service_key: Option<SecretString>,
    ) -> Result<Self, BackendError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(config.anon_key.expose_secret())
                .map_err(|e| BackendError::Unauthorized(format!("Invalid API key format: {e}")))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        let (auth_events, _) = broadcast::channel(16);
        let (hub, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(RestClientInner {
                http,
                base: config.url.clone(),
                anon_key: config.anon_key.clone(),
                service_key,
                session: RwLock::new(None),
                auth_events,
                hub,
                poll_every: config.realtime_poll,
            }),
        })
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    fn bearer(&self) -> String {
        let session = self
            .inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        session.as_ref().map_or_else(
            || {
                self.inner
                    .service_key
                    .as_ref()
                    .unwrap_or(&self.inner.anon_key)
                    .expose_secret()
                    .to_string()
            },
            |s| s.access_token.expose_secret().to_string(),
        )
    }

    fn session_user(&self) -> Option<(UserId, Option<String>)> {
        let session = self
            .inner
            .session
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        session.as_ref().map(|s| (s.user_id, s.email.clone()))
    }

    fn set_session(&self, session: Option<AuthSession>) {
        *self
            .inner
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner) = session;
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, BackendError> {
        let mut url = self.inner.base.join(path)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.inner
            .http
            .request(method, url)
            .bearer_auth(self.bearer())
    }

    /// Send a request and return the body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<String, BackendError> {
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(BackendError::RateLimited(retry_after));
        }

        let body = response.text().await?;
        if status.is_success() {
            return Ok(body);
        }

        let message = body.chars().take(300).collect::<String>();
        tracing::debug!(status = %status, body = %message, "Backend returned non-success status");
        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
            StatusCode::NOT_FOUND => BackendError::NotFound(message),
            _ => BackendError::Api {
                status: status.as_u16(),
                message,
            },
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            BackendError::Parse(e)
        })
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, BackendError> {
        let url = self.url(&format!("rest/v1/{table}"), query)?;
        self.send_json(self.request(Method::GET, url)).await
    }

    /// Write to a table and read back the affected rows.
    async fn write_returning<T: DeserializeOwned, B: serde::Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<Vec<T>, BackendError> {
        let url = self.url(&format!("rest/v1/{table}"), query)?;
        let request = self
            .request(method, url)
            .header("Prefer", "return=representation")
            .json(body);
        self.send_json(request).await
    }

    async fn write<B: serde::Serialize + Sync + ?Sized>(
        &self,
        method: Method,
        table: &str,
        query: &[(&str, String)],
        body: &B,
    ) -> Result<(), BackendError> {
        let url = self.url(&format!("rest/v1/{table}"), query)?;
        let request = self
            .request(method, url)
            .header("Prefer", "return=minimal")
            .json(body);
        self.send(request).await.map(|_| ())
    }

    async fn fetch_profile(&self, user: UserId) -> Result<Option<ProfileRow>, BackendError> {
        let rows: Vec<ProfileRow> = self
            .select(
                "profiles",
                &[
                    ("select", "full_name,email,role,cart".to_string()),
                    ("id", eq(user)),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn identity_for(
        &self,
        user: UserId,
        email: Option<String>,
    ) -> Result<Identity, BackendError> {
        let profile = self.fetch_profile(user).await?;
        let (full_name, role, profile_email) = profile.map_or((None, Role::Member, None), |p| {
            (p.full_name, p.role, p.email)
        });
        Ok(Identity::Authenticated(Account {
            id: user,
            email: email.or(profile_email),
            full_name,
            role,
        }))
    }

    // =========================================================================
    // Realtime polling queries
    // =========================================================================

    pub(super) async fn notifications_since(
        &self,
        user: UserId,
        since: DateTime<Utc>,
    ) -> Result<Vec<Notification>, BackendError> {
        self.select(
            "notifications",
            &[
                ("user_id", eq(user)),
                ("created_at", format!("gt.{}", timestamp(since))),
                ("order", "created_at.asc".to_string()),
            ],
        )
        .await
    }

    pub(super) async fn orders_updated_since(
        &self,
        user: Option<UserId>,
        since: DateTime<Utc>,
    ) -> Result<Vec<Order>, BackendError> {
        let mut query = vec![
            ("updated_at", format!("gt.{}", timestamp(since))),
            ("order", "updated_at.asc".to_string()),
        ];
        if let Some(user) = user {
            query.push(("user_id", eq(user)));
        }
        self.select("orders", &query).await
    }

    pub(super) fn poll_every(&self) -> Duration {
        self.inner.poll_every
    }
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// Postgres reads this literal as the transaction time, so rows are stamped
/// by the server's clock rather than the writer's.
const SERVER_NOW: &str = "now";

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl HostedStore for RestClient {
    #[instrument(skip(self))]
    async fn current_identity(&self) -> Result<Identity, BackendError> {
        let Some((user, email)) = self.session_user() else {
            return Ok(Identity::Guest);
        };

        let url = self.url("auth/v1/user", &[])?;
        match self.send_json::<AuthUser>(self.request(Method::GET, url)).await {
            Ok(auth_user) => self.identity_for(auth_user.id, auth_user.email.or(email)).await,
            Err(BackendError::Unauthorized(reason)) => {
                debug!(%user, %reason, "Session rejected, continuing as guest");
                self.set_session(None);
                let _ = self.inner.auth_events.send(AuthEvent::SignedOut);
                Ok(Identity::Guest)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Identity, BackendError> {
        let url = self.url("auth/v1/token", &[("grant_type", "password".to_string())])?;
        let request = self.inner.http.post(url).json(&json!({
            "email": email.as_str(),
            "password": password.expose_secret(),
        }));
        let token: TokenResponse = self.send_json(request).await?;

        let user = token.user.id;
        let user_email = token.user.email.clone();
        self.set_session(Some(AuthSession {
            access_token: SecretString::from(token.access_token),
            user_id: user,
            email: user_email.clone(),
        }));

        let identity = self.identity_for(user, user_email).await?;
        let _ = self.inner.auth_events.send(AuthEvent::SignedIn(identity.clone()));
        Ok(identity)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), BackendError> {
        let result = match self.session_user() {
            Some(_) => {
                let url = self.url("auth/v1/logout", &[])?;
                self.send(self.request(Method::POST, url)).await.map(|_| ())
            }
            None => Ok(()),
        };
        // The local session is gone either way.
        self.set_session(None);
        let _ = self.inner.auth_events.send(AuthEvent::SignedOut);
        result
    }

    fn auth_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.auth_events.subscribe()
    }

    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, BackendError> {
        let rows: Vec<ProductRecord> = self
            .select(
                "products",
                &[("select", "*".to_string()), ("order", "name.asc".to_string())],
            )
            .await?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[instrument(skip(self, product))]
    async fn insert_product(&self, product: &ProductPatch) -> Result<Product, BackendError> {
        let rows: Vec<ProductRecord> = self
            .write_returning(Method::POST, "products", &[], product)
            .await?;
        rows.into_iter()
            .next()
            .map(Product::from)
            .ok_or_else(|| BackendError::NotFound("inserted product was not returned".to_string()))
    }

    #[instrument(skip(self, patch), fields(product_id = %id))]
    async fn update_product(
        &self,
        id: &ProductId,
        patch: &ProductPatch,
    ) -> Result<Product, BackendError> {
        let rows: Vec<ProductRecord> = self
            .write_returning(Method::PATCH, "products", &[("id", eq(id))], patch)
            .await?;
        rows.into_iter()
            .next()
            .map(Product::from)
            .ok_or_else(|| BackendError::NotFound(format!("product {id}")))
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn delete_product(&self, id: &ProductId) -> Result<(), BackendError> {
        let url = self.url("rest/v1/products", &[("id", eq(id))])?;
        self.send(self.request(Method::DELETE, url)).await.map(|_| ())
    }

    #[instrument(skip(self, order), fields(tracking_code = %order.tracking_code))]
    async fn insert_order(&self, order: &NewOrder) -> Result<Order, BackendError> {
        let rows: Vec<Order> = self
            .write_returning(Method::POST, "orders", &[], order)
            .await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| BackendError::NotFound("inserted order was not returned".to_string()))
    }

    #[instrument(skip(self))]
    async fn orders_for_user(&self, user: UserId) -> Result<Vec<Order>, BackendError> {
        self.select(
            "orders",
            &[("user_id", eq(user)), ("order", "created_at.desc".to_string())],
        )
        .await
    }

    #[instrument(skip(self))]
    async fn all_orders(&self) -> Result<Vec<Order>, BackendError> {
        self.select("orders", &[("order", "created_at.desc".to_string())])
            .await
    }

    #[instrument(skip(self))]
    async fn order_by_tracking_code(&self, code: &str) -> Result<Option<Order>, BackendError> {
        let rows: Vec<Order> = self
            .select(
                "orders",
                &[("tracking_code", eq(code)), ("limit", "1".to_string())],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    #[instrument(skip(self))]
    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<(), BackendError> {
        self.write(
            Method::PATCH,
            "orders",
            &[("id", eq(id))],
            &json!({ "status": status, "updated_at": SERVER_NOW }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn update_payment_status(
        &self,
        id: OrderId,
        status: PaymentStatus,
    ) -> Result<(), BackendError> {
        self.write(
            Method::PATCH,
            "orders",
            &[("id", eq(id))],
            &json!({ "payment_status": status, "updated_at": SERVER_NOW }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn load_cart(&self, user: UserId) -> Result<Option<CartSnapshot>, BackendError> {
        Ok(self
            .fetch_profile(user)
            .await?
            .and_then(|profile| profile.cart_snapshot()))
    }

    #[instrument(skip(self, cart), fields(version = cart.version))]
    async fn save_cart(&self, user: UserId, cart: &CartSnapshot) -> Result<(), BackendError> {
        self.write(
            Method::PATCH,
            "profiles",
            &[("id", eq(user))],
            &json!({ "cart": cart }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn set_role(&self, user: UserId, role: Role) -> Result<(), BackendError> {
        let rows: Vec<serde_json::Value> = self
            .write_returning(
                Method::PATCH,
                "profiles",
                &[("id", eq(user)), ("select", "id".to_string())],
                &json!({ "role": role }),
            )
            .await?;
        if rows.is_empty() {
            return Err(BackendError::NotFound(format!("profile {user}")));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn notifications_for_user(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<Notification>, BackendError> {
        self.select(
            "notifications",
            &[
                ("user_id", eq(user)),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    #[instrument(skip(self, notification), fields(user_id = %notification.user_id))]
    async fn insert_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, BackendError> {
        let rows: Vec<Notification> = self
            .write_returning(Method::POST, "notifications", &[], notification)
            .await?;
        rows.into_iter().next().ok_or_else(|| {
            BackendError::NotFound("inserted notification was not returned".to_string())
        })
    }

    #[instrument(skip(self))]
    async fn mark_notification_read(&self, id: NotificationId) -> Result<(), BackendError> {
        self.write(
            Method::PATCH,
            "notifications",
            &[("id", eq(id))],
            &json!({ "is_read": true }),
        )
        .await
    }

    #[instrument(skip(self))]
    async fn mark_all_notifications_read(&self, user: UserId) -> Result<(), BackendError> {
        self.write(
            Method::PATCH,
            "notifications",
            &[("user_id", eq(user)), ("is_read", "eq.false".to_string())],
            &json!({ "is_read": true }),
        )
        .await
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        let object = object_path(bucket, path);
        let url = self.url(&format!("storage/v1/object/{object}"), &[])?;
        let request = self
            .request(Method::POST, url)
            .header("x-upsert", "true")
            .header("Content-Type", content_type)
            .body(bytes);
        self.send(request).await?;

        Ok(self
            .url(&format!("storage/v1/object/public/{object}"), &[])?
            .to_string())
    }

    fn subscribe(&self, topic: Topic) -> Subscription {
        let receiver = self.inner.hub.subscribe();
        let feeder = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(
                handle
                    .spawn(realtime::feed(self.clone(), topic, self.inner.hub.clone()))
                    .abort_handle(),
            ),
            Err(_) => {
                tracing::warn!(?topic, "No async runtime; realtime subscription will stay idle");
                None
            }
        };
        Subscription::new(topic, receiver, feeder)
    }
}

/// Percent-encode each segment of `bucket/path`, keeping the separators.
fn object_path(bucket: &str, path: &str) -> String {
    std::iter::once(bucket)
        .chain(path.split('/').filter(|s| !s.is_empty()))
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> BackendConfig {
        BackendConfig {
            url: Url::parse("https://abc.hosted.dev/").unwrap(),
            anon_key: SecretString::from("anon"),
            service_key: None,
            realtime_poll: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_table_url_encodes_filters() {
        let client = RestClient::new(&config()).unwrap();
        let url = client
            .url("rest/v1/orders", &[("tracking_code", eq("OJA-AB CD"))])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.hosted.dev/rest/v1/orders?tracking_code=eq.OJA-AB+CD"
        );
    }

    #[test]
    fn test_object_path_encodes_segments() {
        assert_eq!(
            object_path("product-images", "legacy/ankara midi.jpg"),
            "product-images/legacy/ankara%20midi.jpg"
        );
        assert_eq!(object_path("b", "/a.png"), "b/a.png");
    }

    #[test]
    fn test_bearer_prefers_session_then_service_key() {
        let mut cfg = config();
        let client = RestClient::new(&cfg).unwrap();
        assert_eq!(client.bearer(), "anon");

        cfg.service_key = Some(SecretString::from("service"));
        let elevated = RestClient::elevated(&cfg).unwrap();
        assert_eq!(elevated.bearer(), "service");

        elevated.set_session(Some(AuthSession {
            access_token: SecretString::from("user-token"),
            user_id: UserId::random(),
            email: None,
        }));
        assert_eq!(elevated.bearer(), "user-token");
    }

    #[test]
    fn test_elevated_requires_service_key() {
        assert!(matches!(
            RestClient::elevated(&config()),
            Err(BackendError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_guest_without_session() {
        let client = RestClient::new(&config()).unwrap();
        assert_eq!(client.current_identity().await.unwrap(), Identity::Guest);
    }
}
