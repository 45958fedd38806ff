//! Account management commands.
//!
//! # Usage
//!
//! ```bash
//! oja admin grant --user 7d0c3a1e-5b7f-4a53-9f7e-0c6f3f1f9a10 --role admin
//! ```
//!
//! # Environment Variables
//!
//! - `OJA_BACKEND_SERVICE_KEY` - required; role changes bypass row security

use oja_admin::AdminConsole;
use oja_core::{Role, UserId};

use super::CliError;

/// Set the role of an account.
pub async fn grant(console: &AdminConsole, user: &str, role: &str) -> Result<(), CliError> {
    let user: UserId = user
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidArgument(format!("'{user}' is not an account id")))?;
    let role: Role = role.parse().map_err(|_| {
        CliError::InvalidArgument(format!("Invalid role: {role}. Valid roles: admin, member"))
    })?;

    console.grant_role(user, role).await?;
    tracing::info!("Account {user} is now {role}");
    Ok(())
}
