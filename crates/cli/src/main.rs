//! Oja CLI - maintenance and support tools.
//!
//! # Usage
//!
//! ```bash
//! # Upload legacy product images and repoint products at them
//! oja images migrate ./public/images
//!
//! # Look up an order by tracking code
//! oja track OJA-7KQ2MX9D
//!
//! # Make an account an admin
//! oja admin grant --user 7d0c3a1e-... --role admin
//! ```
//!
//! # Commands
//!
//! - `images migrate` - Move product images into object storage (service key)
//! - `track` - Find an order by tracking code
//! - `admin grant` - Change an account's role (service key)

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use oja_storefront::config::StorefrontConfig;

mod commands;

use commands::CliError;

#[derive(Parser)]
#[command(name = "oja")]
#[command(author, version, about = "Oja maintenance tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage product images
    Images {
        #[command(subcommand)]
        action: ImagesAction,
    },
    /// Look up an order by tracking code
    Track {
        /// Tracking code, e.g. OJA-7KQ2MX9D
        code: String,
    },
    /// Manage accounts
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
}

#[derive(Subcommand)]
enum ImagesAction {
    /// Upload every image in a directory and repoint products at it
    Migrate {
        /// Directory holding the legacy image files
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum AdminAction {
    /// Set an account's role
    Grant {
        /// Account id
        #[arg(short, long)]
        user: String,

        /// Role (`admin`, `member`)
        #[arg(short, long, default_value = "admin")]
        role: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &StorefrontConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "oja_cli=info,oja_storefront=info,oja_admin=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = StorefrontConfig::from_env();
    let _sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result = match config {
        Ok(config) => run(cli, &config).await,
        Err(e) => Err(CliError::from(e)),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &StorefrontConfig) -> Result<(), CliError> {
    match cli.command {
        Commands::Images { action } => match action {
            ImagesAction::Migrate { dir } => {
                let console = commands::service_console(config)?;
                commands::images::migrate(&console, &dir).await?;
            }
        },
        Commands::Track { code } => commands::track::run(config, &code).await?,
        Commands::Admin { action } => match action {
            AdminAction::Grant { user, role } => {
                let console = commands::service_console(config)?;
                commands::admin::grant(&console, &user, &role).await?;
            }
        },
    }
    Ok(())
}
