//! Oja Core - Shared domain types.
//!
//! This crate provides the types used across all Oja components:
//! - `storefront` - Catalog, cart and checkout state for a buyer session
//! - `admin` - Product and order mutations for store operators
//! - `cli` - Maintenance commands
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no HTTP
//! clients, no storage. Cart arithmetic and the delivery pricing table live
//! here so they can be tested without a backend.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
