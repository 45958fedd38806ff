//! Who is using the storefront right now.

use serde::{Deserialize, Serialize};

use crate::types::id::UserId;
use crate::types::status::Role;

/// A signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role: Role,
}

/// Either an anonymous guest or a signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Guest,
    Authenticated(Account),
}

impl Identity {
    #[must_use]
    pub const fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Guest => None,
            Self::Authenticated(account) => Some(account.id),
        }
    }

    #[must_use]
    pub const fn account(&self) -> Option<&Account> {
        match self {
            Self::Guest => None,
            Self::Authenticated(account) => Some(account),
        }
    }

    #[must_use]
    pub const fn is_admin(&self) -> bool {
        matches!(self, Self::Authenticated(Account { role: Role::Admin, .. }))
    }
}
