//! Pool synthesis for new (or partially materialized) subscriptions.

use std::collections::{BTreeMap, BTreeSet};

use poolsync_schemas::{attrs, Pool, PoolSource, SubKey, Subscription, UpstreamInfo};
use tracing::{debug, info};

use crate::attributes::expected_attributes;
use crate::quantity::subscription_quantity;
use crate::virt_limit::bonus_quantity;
use crate::RulesConfig;

/// Build the master pool for a subscription without looking at what exists.
///
/// The returned pool has no id; the storage layer assigns one on insert.
pub fn convert_to_master_pool(sub: &Subscription) -> Pool {
    let mut attributes = BTreeMap::new();
    if let Some(v) = sub.product.attribute(attrs::VIRT_ONLY) {
        if !v.is_empty() {
            attributes.insert(attrs::VIRT_ONLY.to_string(), v.to_string());
        }
    }

    Pool {
        id: None,
        product: sub.product.to_ref(),
        derived_product: sub.derived_product.as_ref().map(|p| p.to_ref()),
        provided_products: sub.provided_products.clone(),
        derived_provided_products: sub.derived_provided_products.clone(),
        quantity: subscription_quantity(sub),
        exported: 0,
        start_date: sub.start_date,
        end_date: sub.end_date,
        order: sub.order.clone(),
        branding: sub.branding.clone(),
        attributes,
        product_attributes: expected_attributes(&sub.product),
        derived_product_attributes: sub
            .derived_product
            .as_ref()
            .map(expected_attributes)
            .unwrap_or_default(),
        source: Some(PoolSource::Subscription {
            subscription_id: sub.id.clone(),
            sub_key: SubKey::Master,
        }),
        upstream: sub.upstream.clone(),
    }
}

fn has_sub_key(existing: &[Pool], key: SubKey) -> bool {
    existing.iter().any(|p| p.sub_key() == Some(key))
}

/// Create whatever pools the subscription should have but does not.
///
/// `existing` are the pools already tied to `sub` (empty for a brand-new
/// subscription). Returns at most one master pool followed by at most one
/// bonus pool.
pub fn create_pools(cfg: &RulesConfig, sub: &Subscription, existing: &[Pool]) -> Vec<Pool> {
    let master = convert_to_master_pool(sub);
    let mut out = Vec::with_capacity(2);

    info!(subscription_id = %sub.id, existing = existing.len(), "checking if pools need to be created");

    let bonus = create_bonus_pool(cfg, sub, &master, existing);

    if !has_sub_key(existing, SubKey::Master) {
        info!(subscription_id = %sub.id, quantity = master.quantity, "creating master pool");
        out.push(master);
    }
    if let Some(b) = bonus {
        info!(subscription_id = %sub.id, quantity = b.quantity, "creating bonus pool");
        out.push(b);
    }

    out
}

fn create_bonus_pool(
    cfg: &RulesConfig,
    sub: &Subscription,
    master: &Pool,
    existing: &[Pool],
) -> Option<Pool> {
    let quantity = bonus_quantity(sub.product.attribute(attrs::VIRT_LIMIT), master.quantity)?;

    if has_sub_key(existing, SubKey::Derived) {
        return None;
    }

    let host_limited = sub
        .product
        .attribute(attrs::HOST_LIMITED)
        .map(|v| v == "true")
        .unwrap_or(false);
    if host_limited || cfg.is_standalone() {
        debug!(
            subscription_id = %sub.id,
            host_limited,
            mode = cfg.mode.as_str(),
            "bonus pool not eligible"
        );
        return None;
    }

    let mut bonus = master.clone();
    bonus.quantity = quantity;
    bonus.upstream = UpstreamInfo::default();

    if let Some(derived) = &sub.derived_product {
        bonus.product = derived.to_ref();
        bonus.provided_products = sub.derived_provided_products.clone();
        bonus.product_attributes = expected_attributes(derived);
        bonus.derived_product = None;
        bonus.derived_provided_products = BTreeSet::new();
        bonus.derived_product_attributes = BTreeSet::new();
    }

    bonus.set_attribute(attrs::VIRT_ONLY, "true");
    bonus.set_attribute(attrs::POOL_DERIVED, "true");
    bonus.set_attribute(attrs::PHYSICAL_ONLY, "false");
    // Bonus pools never spawn bonus pools of their own.
    bonus.set_attribute(attrs::VIRT_LIMIT, "0");

    bonus.source = Some(PoolSource::Subscription {
        subscription_id: sub.id.clone(),
        sub_key: SubKey::Derived,
    });

    Some(bonus)
}
