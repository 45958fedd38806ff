//! Unified error handling for admin.

use thiserror::Error;

use oja_storefront::backend::BackendError;

/// Error type for admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The caller is not an admin. Deliberately says nothing more.
    #[error("Forbidden")]
    Forbidden,

    /// A submitted field could not be used.
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// Hosted store operation failed.
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

impl AdminError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Wrap a backend failure, reporting server-class ones to Sentry.
    pub(crate) fn backend(error: BackendError) -> Self {
        let error = Self::Backend(error);
        if error.is_server_error() {
            oja_storefront::error::report(&error, "Admin operation failed");
        }
        error
    }

    /// Whether this is our fault (or the platform's) rather than the caller's.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Backend(
                BackendError::Http(_)
                    | BackendError::Api { .. }
                    | BackendError::Parse(_)
                    | BackendError::Url(_)
                    | BackendError::Unavailable(_)
            )
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_error_display() {
        assert_eq!(AdminError::Forbidden.to_string(), "Forbidden");

        let err = AdminError::invalid("price", "must not be negative");
        assert_eq!(err.to_string(), "Invalid price: must not be negative");
    }

    #[test]
    fn test_server_error_classification() {
        let unavailable = BackendError::Unavailable("down".to_string());
        assert!(AdminError::Backend(unavailable).is_server_error());
        let missing = BackendError::NotFound("order".to_string());
        assert!(!AdminError::Backend(missing).is_server_error());
        assert!(!AdminError::Forbidden.is_server_error());
    }
}
