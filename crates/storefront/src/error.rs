//! Error types with Sentry integration.
//!
//! Buyer-facing failures mostly degrade to fallback data and never surface
//! here. Checkout is the exception: a failed order write is returned to the
//! caller as a [`CheckoutError`] so the buyer can be pointed at support.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;
use crate::storage::StorageError;

/// Support contact shown when checkout cannot complete.
pub const SUPPORT_CONTACT: &str = "support@oja.ng or WhatsApp +234 800 000 0000";

/// Why an order could not be placed.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Nothing to order.
    #[error("cart is empty")]
    EmptyCart,

    /// The destination has no delivery price.
    #[error("no delivery fee for {state}{}", area_suffix(.area.as_deref()))]
    UnknownDeliveryArea { state: String, area: Option<String> },

    /// The order row could not be written.
    #[error("order could not be submitted: {0}")]
    Submit(#[source] BackendError),
}

fn area_suffix(area: Option<&str>) -> String {
    area.map(|a| format!(" / {a}")).unwrap_or_default()
}

impl CheckoutError {
    /// Text for the buyer. Submission failures carry manual-contact instructions
    /// since there is no retry queue behind checkout.
    #[must_use]
    pub fn support_message(&self) -> String {
        match self {
            Self::EmptyCart => "Your bag is empty.".to_string(),
            Self::UnknownDeliveryArea { .. } => {
                "Please choose a delivery area so we can price your delivery.".to_string()
            }
            Self::Submit(_) => format!(
                "We could not place your order. Nothing has been charged. \
                 Please contact us at {SUPPORT_CONTACT} and we will complete it for you."
            ),
        }
    }
}

/// Failure while assembling a storefront from configuration.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Report an error to Sentry and the log.
pub fn report(error: &(dyn std::error::Error + 'static), context: &str) {
    let event_id = sentry::capture_error(error);
    tracing::error!(
        error = %error,
        sentry_event_id = %event_id,
        "{context}"
    );
}

/// Set the Sentry user context from a user ID.
///
/// Call this after sign-in to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on sign-out to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for buyer actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of actions
/// leading up to an error, e.g. the cart changes before a failed checkout.
pub fn add_breadcrumb(category: &str, message: &str, data: &[(&str, &str)]) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    for (key, value) in data {
        breadcrumb.data.insert(
            (*key).to_string(),
            serde_json::Value::String((*value).to_string()),
        );
    }

    sentry::add_breadcrumb(breadcrumb);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_error_display() {
        let err = CheckoutError::UnknownDeliveryArea {
            state: "Lagos".to_string(),
            area: Some("Atlantis".to_string()),
        };
        assert_eq!(err.to_string(), "no delivery fee for Lagos / Atlantis");
        assert_eq!(CheckoutError::EmptyCart.to_string(), "cart is empty");
    }

    #[test]
    fn test_submit_failure_points_to_support() {
        let err = CheckoutError::Submit(BackendError::Unavailable("timeout".to_string()));
        let message = err.support_message();
        assert!(message.contains(SUPPORT_CONTACT));
        assert!(!message.contains("timeout"));
    }
}
