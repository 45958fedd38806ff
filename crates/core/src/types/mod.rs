//! Domain types for Oja.

pub mod cart;
pub mod delivery;
pub mod email;
pub mod id;
pub mod identity;
pub mod money;
pub mod notification;
pub mod order;
pub mod product;
pub mod status;

pub use cart::{Cart, CartLine, OrderTotals};
pub use delivery::delivery_fee;
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::{Account, Identity};
pub use money::Naira;
pub use notification::{NewNotification, Notification};
pub use order::{CheckoutDetails, GuestOrder, NewOrder, Order};
pub use product::Product;
pub use status::*;
