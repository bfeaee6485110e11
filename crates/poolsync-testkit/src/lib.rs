//! Fixture builders and snapshot IO shared by the scenario tests.
//!
//! Every fixture is dated inside 2024 so tests can compare against fixed
//! instants; nothing here reads the clock.

use std::collections::BTreeSet;
use std::fs;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use poolsync_schemas::{
    attrs, Entitlement, OrderInfo, Pool, PoolSource, Product, ProductPoolAttribute, ProductRef,
    RefreshSnapshot, SubKey, Subscription, UpstreamInfo,
};

/// Midnight UTC on the given day.
pub fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
        .single()
        .expect("valid fixture date")
}

/// A fixed "now" after every fixture date.
pub fn now() -> DateTime<Utc> {
    ts(2024, 6, 1)
}

pub fn product(id: &str) -> Product {
    Product::new(id, format!("{id} name"))
}

/// Subscription for `product`, valid for calendar 2024, with order numbers set.
pub fn subscription(id: &str, product: Product, quantity: i64) -> Subscription {
    Subscription {
        id: id.to_string(),
        product,
        derived_product: None,
        provided_products: BTreeSet::new(),
        derived_provided_products: BTreeSet::new(),
        quantity,
        start_date: ts(2024, 1, 1),
        end_date: ts(2025, 1, 1),
        order: OrderInfo {
            contract_number: Some(format!("{id}-contract")),
            account_number: Some(format!("{id}-account")),
            order_number: Some(format!("{id}-order")),
        },
        branding: BTreeSet::new(),
        upstream: UpstreamInfo::default(),
    }
}

/// Subscription carrying a derived (guest) product with its own provided set.
pub fn subscription_with_derived(
    id: &str,
    product: Product,
    derived: Product,
    quantity: i64,
) -> Subscription {
    let mut sub = subscription(id, product, quantity);
    sub.derived_provided_products
        .insert(ProductRef::new(format!("{}-eng", derived.id), "derived engineering"));
    sub.derived_product = Some(derived);
    sub
}

pub fn tagged_attributes(product: &Product) -> BTreeSet<ProductPoolAttribute> {
    product
        .attributes
        .iter()
        .map(|(k, v)| ProductPoolAttribute::new(&product.id, k, v))
        .collect()
}

/// A bare pool for `product` with no source, dated like [`subscription`].
pub fn pool(id: &str, product: &Product, quantity: i64) -> Pool {
    Pool {
        id: Some(id.to_string()),
        product: product.to_ref(),
        derived_product: None,
        provided_products: BTreeSet::new(),
        derived_provided_products: BTreeSet::new(),
        quantity,
        exported: 0,
        start_date: ts(2024, 1, 1),
        end_date: ts(2025, 1, 1),
        order: OrderInfo::default(),
        branding: BTreeSet::new(),
        attributes: Default::default(),
        product_attributes: tagged_attributes(product),
        derived_product_attributes: BTreeSet::new(),
        source: None,
        upstream: UpstreamInfo::default(),
    }
}

pub fn tie_to_subscription(pool: &mut Pool, subscription_id: &str, sub_key: SubKey) {
    pool.source = Some(PoolSource::Subscription {
        subscription_id: subscription_id.to_string(),
        sub_key,
    });
}

/// A pool that declares `stacking_id`, as entitlements in a stack draw from.
pub fn stackable_pool(id: &str, product: Product, stack_id: &str) -> Pool {
    let product = product.with_attribute(attrs::STACKING_ID, stack_id);
    let mut p = pool(id, &product, 10);
    tie_to_subscription(&mut p, &format!("sub-{id}"), SubKey::Master);
    p
}

/// A stack-derived pool owned by `consumer_uuid`.
pub fn stack_pool(id: &str, consumer_uuid: &str, stack_id: &str) -> Pool {
    let mut p = pool(id, &product("stack-placeholder"), 1);
    p.set_attribute(attrs::POOL_DERIVED, "true");
    p.source = Some(PoolSource::Stack {
        consumer_uuid: Some(consumer_uuid.to_string()),
        stack_id: stack_id.to_string(),
    });
    p
}

pub fn entitlement(
    id: &str,
    consumer_uuid: &str,
    pool_id: &str,
    created: Option<DateTime<Utc>>,
) -> Entitlement {
    Entitlement {
        id: Some(id.to_string()),
        consumer_uuid: consumer_uuid.to_string(),
        pool_id: pool_id.to_string(),
        quantity: 1,
        start_date: ts(2024, 1, 1),
        end_date: ts(2025, 1, 1),
        created,
        dirty: false,
    }
}

// ---------------------------------------------------------------------------
// Snapshot files
// ---------------------------------------------------------------------------

pub fn load_snapshot_json(path: &str) -> Result<RefreshSnapshot> {
    let s = fs::read_to_string(path).with_context(|| format!("read snapshot: {path}"))?;
    let snap: RefreshSnapshot = serde_json::from_str(&s).context("parse snapshot json")?;
    Ok(snap)
}

pub fn write_snapshot_json(path: &str, snapshot: &RefreshSnapshot) -> Result<()> {
    let s = serde_json::to_string_pretty(snapshot).context("serialize snapshot")?;
    fs::write(path, s).with_context(|| format!("write snapshot: {path}"))?;
    Ok(())
}
