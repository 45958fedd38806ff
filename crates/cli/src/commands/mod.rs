//! Command implementations.

pub mod admin;
pub mod images;
pub mod track;

use thiserror::Error;

use oja_admin::{AdminConsole, AdminError};
use oja_storefront::backend::{BackendError, RestClient};
use oja_storefront::config::{ConfigError, StorefrontConfig};
use oja_storefront::error::StartupError;

/// Errors that can end a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Startup error: {0}")]
    Startup(#[from] StartupError),

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("{0}")]
    Admin(#[from] AdminError),

    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("No order found for tracking code {0}")]
    NotFound(String),
}

/// Admin console authorized by the service key.
pub fn service_console(config: &StorefrontConfig) -> Result<AdminConsole, CliError> {
    let client = RestClient::elevated(&config.backend)?;
    Ok(AdminConsole::for_service(client, config.image_bucket.clone())?)
}
