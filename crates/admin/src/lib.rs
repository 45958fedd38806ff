//! Oja admin library.
//!
//! Product, order and account management for shop staff. Every operation
//! requires an [`AdminConsole`], which is only handed to admins.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod console;
pub mod error;
pub mod form;

pub use console::{AdminConsole, NotificationOutcome, RESTOCK_QUANTITY, StatusChange};
pub use error::AdminError;
pub use form::{ProductDraft, ProductForm};
