//! Order tracking lookup.
//!
//! Searches the hosted store, then this machine's guest order list.

use oja_storefront::Storefront;
use oja_storefront::config::StorefrontConfig;
use oja_storefront::tracking::TrackedOrder;

use super::CliError;

/// Print what is known about the order with tracking code `code`.
pub async fn run(config: &StorefrontConfig, code: &str) -> Result<(), CliError> {
    let storefront = Storefront::from_config(config)?;
    let found = storefront
        .tracker()
        .lookup(code)
        .await
        .ok_or_else(|| CliError::NotFound(code.trim().to_owned()))?;
    tracing::info!("{}", describe(&found));
    Ok(())
}

fn describe(order: &TrackedOrder) -> String {
    match order {
        TrackedOrder::Remote(order) => format!(
            "{}: {} (payment {}), {} to {}, placed {}",
            order.tracking_code,
            order.status,
            order.payment_status,
            order.total_amount,
            order.shipping_state,
            order.created_at.format("%d %b %Y"),
        ),
        TrackedOrder::Local(order) => format!(
            "{}: placed on this device {}, {} for {} items (status unavailable offline)",
            order.tracking_code,
            order.date.format("%d %b %Y"),
            order.total,
            order.items.iter().map(|l| l.quantity).sum::<u32>(),
        ),
    }
}
