//! Scenario: Pool Synthesis for New Subscriptions
//!
//! # Invariants under test
//!
//! 1. A new subscription yields one master pool tagged "master".
//! 2. Quantity applies the product multiplier, and the instance multiplier
//!    only when the subscription has no upstream pool id.
//! 3. A virt_limit subscription also yields one bonus pool tagged "derived"
//!    with the guest attributes set, sized from the master quantity.
//! 4. host_limited and standalone mode suppress the bonus pool.
//! 5. Only missing pools are created.
//! 6. Branding, provided products and product attributes are copied.

use poolsync_reconcile::{create_pools, update_pools, RulesConfig};
use poolsync_schemas::{attrs, Branding, ProductRef, SubKey};
use poolsync_testkit::{product, subscription, subscription_with_derived, tagged_attributes};

// ---------------------------------------------------------------------------
// 1. Master pool
// ---------------------------------------------------------------------------

#[test]
fn new_subscription_gets_single_master_pool() {
    let s = subscription("sub-1", product("sku"), 7);
    let pools = create_pools(&RulesConfig::hosted(), &s, &[]);

    assert_eq!(pools.len(), 1);
    let master = &pools[0];
    assert_eq!(master.id, None);
    assert_eq!(master.subscription_id(), Some("sub-1"));
    assert_eq!(master.sub_key(), Some(SubKey::Master));
    assert_eq!(master.quantity, 7);
    assert_eq!(master.start_date, s.start_date);
    assert_eq!(master.end_date, s.end_date);
    assert_eq!(master.order, s.order);
    assert!(!master.is_derived());
}

#[test]
fn virt_only_product_marks_master_pool() {
    let s = subscription("sub-1", product("sku").with_attribute(attrs::VIRT_ONLY, "true"), 1);
    let pools = create_pools(&RulesConfig::hosted(), &s, &[]);
    assert!(pools[0].is_virt_only());

    let blank = subscription("sub-2", product("sku").with_attribute(attrs::VIRT_ONLY, ""), 1);
    let pools = create_pools(&RulesConfig::hosted(), &blank, &[]);
    assert!(!pools[0].has_attribute(attrs::VIRT_ONLY));
}

// ---------------------------------------------------------------------------
// 2. Multipliers
// ---------------------------------------------------------------------------

#[test]
fn instance_multiplier_applies_without_upstream_pool() {
    let p = product("sku")
        .with_multiplier(2)
        .with_attribute(attrs::INSTANCE_MULTIPLIER, "3");
    let s = subscription("sub-1", p, 5);

    let pools = create_pools(&RulesConfig::hosted(), &s, &[]);
    assert_eq!(pools[0].quantity, 30);
}

#[test]
fn instance_multiplier_skipped_for_imported_subscription() {
    let p = product("sku")
        .with_multiplier(2)
        .with_attribute(attrs::INSTANCE_MULTIPLIER, "3");
    let mut s = subscription("sub-1", p, 5);
    s.upstream.pool_id = Some("upstream-pool".to_string());
    s.upstream.entitlement_id = Some("upstream-ent".to_string());

    let mut pools = create_pools(&RulesConfig::hosted(), &s, &[]);
    assert_eq!(pools[0].quantity, 10);
    assert_eq!(pools[0].upstream, s.upstream);

    let updates = update_pools(&RulesConfig::hosted(), &s, &mut pools, None);
    assert!(!updates[0].changed());
}

#[test]
fn unlimited_subscription_is_never_multiplied() {
    let s = subscription("sub-1", product("sku").with_multiplier(4), -1);
    let pools = create_pools(&RulesConfig::hosted(), &s, &[]);
    assert_eq!(pools[0].quantity, -1);
}

// ---------------------------------------------------------------------------
// 3. Bonus pool
// ---------------------------------------------------------------------------

#[test]
fn virt_limit_subscription_gets_bonus_pool() {
    let s = subscription("sub-1", product("sku").with_attribute(attrs::VIRT_LIMIT, "4"), 10);
    let pools = create_pools(&RulesConfig::hosted(), &s, &[]);
    assert_eq!(pools.len(), 2);

    let bonus = &pools[1];
    assert_eq!(bonus.sub_key(), Some(SubKey::Derived));
    assert_eq!(bonus.subscription_id(), Some("sub-1"));
    assert_eq!(bonus.quantity, 40);
    assert_eq!(bonus.attribute(attrs::VIRT_ONLY), Some("true"));
    assert_eq!(bonus.attribute(attrs::POOL_DERIVED), Some("true"));
    assert_eq!(bonus.attribute(attrs::PHYSICAL_ONLY), Some("false"));
    assert_eq!(bonus.attribute(attrs::VIRT_LIMIT), Some("0"));
}

#[test]
fn bonus_pool_takes_derived_product_identity() {
    let s = subscription_with_derived(
        "sub-1",
        product("sku").with_attribute(attrs::VIRT_LIMIT, "unlimited"),
        product("guest").with_attribute("cores", "4"),
        2,
    );
    let pools = create_pools(&RulesConfig::hosted(), &s, &[]);
    let (master, bonus) = (&pools[0], &pools[1]);

    assert_eq!(master.product.id, "sku");
    assert_eq!(master.derived_product.as_ref().map(|p| p.id.as_str()), Some("guest"));
    assert_eq!(
        master.derived_product_attributes,
        tagged_attributes(s.derived_product.as_ref().unwrap())
    );

    assert_eq!(bonus.product, ProductRef::new("guest", "guest name"));
    assert_eq!(bonus.provided_products, s.derived_provided_products);
    assert_eq!(bonus.derived_product, None);
    assert!(bonus.derived_product_attributes.is_empty());
    assert!(bonus.product_attributes.iter().all(|a| a.product_id == "guest"));
    assert_eq!(bonus.quantity, -1);
}

// ---------------------------------------------------------------------------
// 4. Suppression
// ---------------------------------------------------------------------------

#[test]
fn host_limited_subscription_gets_no_bonus_pool() {
    let s = subscription(
        "sub-1",
        product("sku")
            .with_attribute(attrs::VIRT_LIMIT, "4")
            .with_attribute(attrs::HOST_LIMITED, "true"),
        10,
    );
    assert_eq!(create_pools(&RulesConfig::hosted(), &s, &[]).len(), 1);
}

#[test]
fn standalone_mode_gets_no_bonus_pool() {
    let s = subscription("sub-1", product("sku").with_attribute(attrs::VIRT_LIMIT, "4"), 10);
    assert_eq!(create_pools(&RulesConfig::standalone(), &s, &[]).len(), 1);
}

#[test]
fn zero_virt_limit_gets_no_bonus_pool() {
    let s = subscription("sub-1", product("sku").with_attribute(attrs::VIRT_LIMIT, "0"), 10);
    assert_eq!(create_pools(&RulesConfig::hosted(), &s, &[]).len(), 1);
}

// ---------------------------------------------------------------------------
// 5. Create missing only
// ---------------------------------------------------------------------------

#[test]
fn only_missing_pools_are_created() {
    let cfg = RulesConfig::hosted();
    let s = subscription("sub-1", product("sku").with_attribute(attrs::VIRT_LIMIT, "4"), 10);
    let all = create_pools(&cfg, &s, &[]);

    let only_bonus = create_pools(&cfg, &s, &all[..1]);
    assert_eq!(only_bonus.len(), 1);
    assert_eq!(only_bonus[0].sub_key(), Some(SubKey::Derived));

    let only_master = create_pools(&cfg, &s, &all[1..]);
    assert_eq!(only_master.len(), 1);
    assert_eq!(only_master[0].sub_key(), Some(SubKey::Master));

    assert!(create_pools(&cfg, &s, &all).is_empty());
}

// ---------------------------------------------------------------------------
// 6. Copies
// ---------------------------------------------------------------------------

#[test]
fn branding_and_provided_products_are_copied() {
    let mut s = subscription("sub-1", product("sku").with_attribute("arch", "x86_64"), 1);
    s.branding.insert(Branding::new("os", "OS", "Branded"));
    s.provided_products.insert(ProductRef::new("eng-1", "Engineering"));

    let pools = create_pools(&RulesConfig::hosted(), &s, &[]);
    assert_eq!(pools[0].branding, s.branding);
    assert_eq!(pools[0].provided_products, s.provided_products);
    assert_eq!(pools[0].product_attributes, tagged_attributes(&s.product));
}
