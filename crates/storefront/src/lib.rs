//! Oja storefront library.
//!
//! The buyer-side core of the shop: configuration, the hosted backend client,
//! device storage, the product catalog, the cart/order state and order
//! tracking. Rendering is left to the embedding application.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod state;
pub mod storage;
pub mod store;
pub mod tracking;

pub use state::Storefront;
