use poolsync_schemas::{attrs, Product, Subscription, UNLIMITED_QUANTITY};
use tracing::{debug, warn};

/// Pool quantity implied by a subscription quantity.
///
/// - negative input => unlimited (`-1`), never multiplied
/// - otherwise `quantity * product.multiplier`
/// - times `instance_multiplier` when the product declares one and the
///   subscription was not imported from upstream (`upstream_pool_id` unset);
///   imported quantities were already adjusted where they came from
///
/// An unparseable or negative `instance_multiplier` is logged and ignored.
///
/// # Panics
///
/// If `product.multiplier < 1`.
pub fn calculate_quantity(quantity: i64, product: &Product, upstream_pool_id: Option<&str>) -> i64 {
    assert!(
        product.multiplier >= 1,
        "product {} has multiplier {} (must be >= 1)",
        product.id,
        product.multiplier
    );

    if quantity < 0 {
        return UNLIMITED_QUANTITY;
    }

    let mut result = quantity.saturating_mul(product.multiplier);

    if upstream_pool_id.is_some() {
        return result;
    }

    if let Some(raw) = product.attribute(attrs::INSTANCE_MULTIPLIER) {
        match raw.trim().parse::<i64>() {
            Ok(m) if m >= 0 => {
                debug!(product_id = %product.id, instance_multiplier = m, "applying instance multiplier");
                result = result.saturating_mul(m);
            }
            // Output stays non-negative; a negative factor is skipped like garbage.
            Ok(m) => {
                warn!(
                    product_id = %product.id,
                    instance_multiplier = m,
                    "negative instance_multiplier attribute, ignoring"
                );
            }
            Err(_) => {
                warn!(
                    product_id = %product.id,
                    value = raw,
                    "invalid instance_multiplier attribute, ignoring"
                );
            }
        }
    }

    result
}

/// [`calculate_quantity`] for a subscription's primary product.
pub fn subscription_quantity(sub: &Subscription) -> i64 {
    calculate_quantity(sub.quantity, &sub.product, sub.upstream_pool_id())
}
