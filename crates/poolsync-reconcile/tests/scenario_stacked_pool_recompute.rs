//! Scenario: Stacked Pool Recomputation
//!
//! # Invariants under test
//!
//! 1. An empty stack leaves the pool untouched and marks nothing dirty.
//! 2. The eldest persisted entitlement supplies identity and order numbers;
//!    an unpersisted entitlement never wins a timestamp tie.
//! 3. Quantity follows the eldest member whose pool declares virt_limit,
//!    with the same tie-break as identity, and is untouched when no member
//!    does.
//! 4. Dates widen to the envelope of the whole stack.
//! 5. Attributes are the union across the stack.
//! 6. Any change marks every drawn entitlement dirty; no change marks none.
//! 7. Removing the eldest moves identity to the next eldest.
//! 8. Subscription links are replaced by a stack link.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use poolsync_reconcile::{recompute_stacked_pool, StackedEntitlement};
use poolsync_schemas::{attrs, Entitlement, OrderInfo, Pool, PoolSource, ProductRef};
use poolsync_testkit::{entitlement, now, product, stack_pool, stackable_pool, ts};

const CONSUMER: &str = "consumer-1";

fn member(ent_id: &str, pool: &Pool, created: Option<DateTime<Utc>>) -> StackedEntitlement {
    let pool_id = pool.id.clone().unwrap();
    StackedEntitlement {
        entitlement: entitlement(ent_id, CONSUMER, &pool_id, created),
        pool: pool.clone(),
    }
}

fn pool_a() -> Pool {
    let mut p = stackable_pool(
        "pool-a",
        product("sku-a").with_attribute(attrs::VIRT_LIMIT, "2"),
        "stack-a",
    );
    p.order.contract_number = Some("contract-a".to_string());
    p
}

fn pool_b() -> Pool {
    let mut p = stackable_pool(
        "pool-b",
        product("sku-b").with_attribute("sockets", "4"),
        "stack-a",
    );
    p.order.contract_number = Some("contract-b".to_string());
    p
}

fn no_drawn<'a>() -> Vec<&'a mut Entitlement> {
    Vec::new()
}

fn guests(n: usize) -> Vec<Entitlement> {
    (0..n)
        .map(|i| entitlement(&format!("guest-{i}"), "guest", "stack-pool", Some(ts(2024, 3, 1))))
        .collect()
}

// ---------------------------------------------------------------------------
// 1. Empty stack
// ---------------------------------------------------------------------------

#[test]
fn empty_stack_is_noop() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let before = sp.clone();
    let mut drawn = guests(2);

    let update = recompute_stacked_pool(&mut sp, &[], drawn.iter_mut(), None, now());

    assert!(!update.changed());
    assert_eq!(update.dirty_entitlements, 0);
    assert_eq!(sp, before);
    assert!(drawn.iter().all(|e| !e.dirty));
}

// ---------------------------------------------------------------------------
// 2. Eldest selection
// ---------------------------------------------------------------------------

#[test]
fn eldest_supplies_identity_and_order() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let stack = vec![
        member("ent-b", &pool_b(), Some(ts(2024, 2, 1))),
        member("ent-a", &pool_a(), Some(ts(2024, 1, 10))),
    ];

    let update = recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());

    assert!(update.products_changed);
    assert!(update.order_changed);
    assert_eq!(sp.product, ProductRef::new("sku-a", "sku-a name"));
    assert_eq!(sp.order.contract_number.as_deref(), Some("contract-a"));
}

#[test]
fn unpersisted_entitlement_never_wins_tie() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let stack = vec![
        member("ent-b", &pool_b(), None),
        member("ent-a", &pool_a(), Some(now())),
    ];

    recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());
    assert_eq!(sp.product.id, "sku-a");
}

#[test]
fn eldest_derived_product_becomes_identity() {
    let mut source = pool_b();
    source.derived_product = Some(ProductRef::new("guest-sku", "Guest SKU"));
    source
        .derived_provided_products
        .insert(ProductRef::new("guest-eng", "Guest Engineering"));

    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let stack = vec![member("ent-b", &source, Some(ts(2024, 1, 1)))];
    recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());

    assert_eq!(sp.product, ProductRef::new("guest-sku", "Guest SKU"));
    assert_eq!(sp.provided_products, source.derived_provided_products);
}

// ---------------------------------------------------------------------------
// 3. Quantity
// ---------------------------------------------------------------------------

#[test]
fn quantity_from_eldest_virt_limited_member() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    // pool-b is eldest but carries no virt_limit.
    let stack = vec![
        member("ent-b", &pool_b(), Some(ts(2024, 1, 1))),
        member("ent-a", &pool_a(), Some(ts(2024, 2, 1))),
    ];

    let update = recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());
    assert!(update.quantity_changed);
    assert_eq!(sp.quantity, 2);
    assert_eq!(sp.product.id, "sku-b");
}

#[test]
fn quantity_untouched_without_virt_limit() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    sp.quantity = 9;
    let stack = vec![member("ent-b", &pool_b(), Some(ts(2024, 1, 1)))];

    let update = recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());
    assert!(!update.quantity_changed);
    assert_eq!(sp.quantity, 9);
}

#[test]
fn unlimited_virt_limit_gives_sentinel() {
    let source = stackable_pool(
        "pool-u",
        product("sku-u").with_attribute(attrs::VIRT_LIMIT, "unlimited"),
        "stack-a",
    );
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let stack = vec![member("ent-u", &source, Some(ts(2024, 1, 1)))];

    recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());
    assert_eq!(sp.quantity, -1);
}

#[test]
fn virt_limited_member_tie_goes_to_persisted_entitlement() {
    let persisted = stackable_pool(
        "pool-c",
        product("sku-c").with_attribute(attrs::VIRT_LIMIT, "5"),
        "stack-a",
    );
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    // pool-b is eldest overall but carries no virt_limit; the two
    // virt-limited members tie on `now`, one of them not yet persisted.
    let stack = vec![
        member("ent-a", &pool_a(), None),
        member("ent-c", &persisted, Some(now())),
        member("ent-b", &pool_b(), Some(ts(2024, 1, 1))),
    ];

    let update = recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());
    assert!(update.quantity_changed);
    assert_eq!(sp.quantity, 5);
    assert_eq!(sp.product.id, "sku-b");
}

// ---------------------------------------------------------------------------
// 4. Date envelope
// ---------------------------------------------------------------------------

#[test]
fn dates_cover_whole_stack() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let mut early = member("ent-a", &pool_a(), Some(ts(2024, 1, 1)));
    early.entitlement.start_date = ts(2023, 12, 1);
    let mut late = member("ent-b", &pool_b(), Some(ts(2024, 2, 1)));
    late.entitlement.end_date = ts(2025, 6, 1);

    let update = recompute_stacked_pool(&mut sp, &[early, late], no_drawn(), None, now());
    assert!(update.dates_changed);
    assert_eq!(sp.start_date, ts(2023, 12, 1));
    assert_eq!(sp.end_date, ts(2025, 6, 1));
}

// ---------------------------------------------------------------------------
// 5. Attribute union
// ---------------------------------------------------------------------------

#[test]
fn attributes_are_union_of_stack() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let a = pool_a();
    let b = pool_b();
    let stack = vec![
        member("ent-a", &a, Some(ts(2024, 1, 1))),
        member("ent-b", &b, Some(ts(2024, 2, 1))),
    ];

    let update = recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());
    assert!(update.product_attributes_changed);
    let expected: BTreeSet<_> = a
        .product_attributes
        .union(&b.product_attributes)
        .cloned()
        .collect();
    assert_eq!(sp.product_attributes, expected);
    assert_eq!(sp.product_attributes.len(), 4);
}

// ---------------------------------------------------------------------------
// 6. Dirty marking
// ---------------------------------------------------------------------------

#[test]
fn change_marks_all_drawn_entitlements_dirty() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let stack = vec![member("ent-a", &pool_a(), Some(ts(2024, 1, 1)))];
    let mut drawn = guests(3);

    let update = recompute_stacked_pool(&mut sp, &stack, drawn.iter_mut(), None, now());
    assert!(update.changed());
    assert_eq!(update.dirty_entitlements, 3);
    assert!(drawn.iter().all(|e| e.dirty));

    let mut again = guests(3);
    let update = recompute_stacked_pool(&mut sp, &stack, again.iter_mut(), None, now());
    assert!(!update.changed());
    assert_eq!(update.dirty_entitlements, 0);
    assert!(again.iter().all(|e| !e.dirty));
}

// ---------------------------------------------------------------------------
// 7. Removing the eldest
// ---------------------------------------------------------------------------

#[test]
fn removing_eldest_moves_identity() {
    let mut sp = stack_pool("stack-pool", CONSUMER, "stack-a");
    let a = member("ent-a", &pool_a(), Some(ts(2024, 1, 1)));
    let b = member("ent-b", &pool_b(), Some(ts(2024, 2, 1)));

    recompute_stacked_pool(&mut sp, &[a, b.clone()], no_drawn(), None, now());
    assert_eq!(sp.product.id, "sku-a");

    let update = recompute_stacked_pool(&mut sp, &[b], no_drawn(), None, now());
    assert!(update.products_changed);
    assert!(update.product_attributes_changed);
    assert!(update.order_changed);
    assert_eq!(sp.product.id, "sku-b");
    assert_eq!(sp.order.contract_number.as_deref(), Some("contract-b"));
    // Quantity is left as the last virt-limited member set it.
    assert_eq!(sp.quantity, 2);
}

// ---------------------------------------------------------------------------
// 8. Source links
// ---------------------------------------------------------------------------

#[test]
fn subscription_link_replaced_by_stack_link() {
    let mut sp = pool_b();
    sp.id = Some("was-sub-pool".to_string());
    sp.order = OrderInfo::default();
    let stack = vec![member("ent-a", &pool_a(), Some(ts(2024, 1, 1)))];

    recompute_stacked_pool(&mut sp, &stack, no_drawn(), None, now());

    assert_eq!(sp.subscription_id(), None);
    assert_eq!(
        sp.source,
        Some(PoolSource::Stack {
            consumer_uuid: Some(CONSUMER.to_string()),
            stack_id: "stack-a".to_string(),
        })
    );
}
