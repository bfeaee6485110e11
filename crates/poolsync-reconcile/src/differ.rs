use poolsync_schemas::{attrs, Pool, SubKey, Subscription};
use tracing::{debug, warn};

use crate::attributes::{project_derived_product_attributes, project_product_attributes};
use crate::checks::{
    check_branding, check_dates, check_derived_products, check_order, check_products,
    check_quantity, DerivedIdentity, ProductIdentity,
};
use crate::quantity::subscription_quantity;
use crate::virt_limit::decide_virt_limit;
use crate::{ChangedProducts, PoolUpdate, RulesConfig};

/// `exported` counter of the group's master pool: the last pool that does not
/// carry `pool_derived`.
pub fn master_exported(pools: &[Pool]) -> Option<i64> {
    pools
        .iter()
        .filter(|p| !p.is_derived())
        .last()
        .map(|p| p.exported)
}

/// Bring every pool tied to `sub` back in line with it.
///
/// Pools are mutated in place; one [`PoolUpdate`] is returned per pool that
/// belongs to the subscription, in input order, whether or not it changed.
/// Pools without a subscription id (stack or entitlement derived) or tied to
/// another subscription are skipped.
pub fn update_pools(
    cfg: &RulesConfig,
    sub: &Subscription,
    existing: &mut [Pool],
    changed_products: Option<&ChangedProducts>,
) -> Vec<PoolUpdate> {
    debug!(subscription_id = %sub.id, existing = existing.len(), "refreshing pools for subscription");

    let base = subscription_quantity(sub);
    let exported = master_exported(existing);
    let mut updates = Vec::with_capacity(existing.len());

    for pool in existing.iter_mut() {
        if pool.subscription_id() != Some(sub.id.as_str()) {
            debug!(pool_id = ?pool.id, "pool not tied to subscription, skipping");
            continue;
        }

        if pool.sub_key() == Some(SubKey::Master) {
            pool.upstream = sub.upstream.clone();
        }

        let update = update_pool(cfg, sub, pool, base, exported, changed_products);
        if !update.changed() {
            debug!(pool_id = ?pool.id, "no updates required");
        }
        updates.push(update);
    }

    updates
}

fn update_pool(
    cfg: &RulesConfig,
    sub: &Subscription,
    pool: &mut Pool,
    base: i64,
    exported: Option<i64>,
    changed_products: Option<&ChangedProducts>,
) -> PoolUpdate {
    let mut update = PoolUpdate::new(pool);

    // 1) Dates
    if let Some((start, end)) = check_dates(sub.start_date, sub.end_date, pool) {
        pool.start_date = start;
        pool.end_date = end;
        update.dates_changed = true;
    }

    // 2) Quantity (virt_limit aware)
    let decision = decide_virt_limit(cfg, sub, pool, base, exported);
    if decision.is_tombstone() && !pool.is_marked_for_delete() {
        warn!(
            pool_id = ?pool.id,
            subscription_id = %sub.id,
            "virt_limit removed from subscription, flagging pool for deletion"
        );
        pool.set_attribute(attrs::DELETE_FLAG, "true");
    }
    if let Some(q) = check_quantity(decision.expected_quantity(base), pool) {
        pool.quantity = q;
        update.quantity_changed = true;
    }

    // Bonus pools take their identity from the derived product when there is one.
    let use_derived = pool.is_derived() && sub.derived_product.is_some();

    // 3) Products
    let expected = match (&sub.derived_product, use_derived) {
        (Some(derived), true) => ProductIdentity {
            product: derived.to_ref(),
            provided: sub.derived_provided_products.clone(),
        },
        _ => ProductIdentity {
            product: sub.product.to_ref(),
            provided: sub.provided_products.clone(),
        },
    };
    if let Some(next) = check_products(expected, pool, changed_products) {
        next.commit(pool);
        update.products_changed = true;
    }

    // 4) Derived products
    if !use_derived {
        let expected = DerivedIdentity {
            product: sub.derived_product.as_ref().map(|p| p.to_ref()),
            provided: sub.derived_provided_products.clone(),
        };
        if let Some(next) = check_derived_products(expected, pool) {
            next.commit(pool);
            update.derived_products_changed = true;
        }
    }

    // 5) Product attributes
    let source = match (&sub.derived_product, use_derived) {
        (Some(derived), true) => derived,
        _ => &sub.product,
    };
    update.product_attributes_changed = project_product_attributes(source, pool);

    // 6) Derived product attributes
    if !pool.is_derived() {
        update.derived_product_attributes_changed =
            project_derived_product_attributes(sub.derived_product.as_ref(), pool);
    }

    // 7) Order
    if let Some(next) = check_order(&sub.order, pool) {
        pool.order = next;
        update.order_changed = true;
    }

    // 8) Branding
    if let Some(next) = check_branding(&sub.branding, pool) {
        pool.branding = next;
        update.branding_changed = true;
    }

    update
}
