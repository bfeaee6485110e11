//! Stack-derived pool recomputation ("eldest wins").

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use poolsync_schemas::{attrs, Entitlement, Pool, PoolSource, ProductPoolAttribute, UNLIMITED_QUANTITY};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::attributes::diff_attribute_set;
use crate::checks::{check_dates, check_order, check_products, check_quantity, ProductIdentity};
use crate::{ChangedProducts, PoolUpdate};

/// One live member of a stack: the entitlement and the pool it draws from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackedEntitlement {
    pub entitlement: Entitlement,
    pub pool: Pool,
}

/// Ordering key for eldest selection. Unpersisted entitlements count as
/// created `now` and lose ties against persisted ones.
fn age_key(e: &StackedEntitlement, now: DateTime<Utc>) -> (DateTime<Utc>, bool) {
    (e.entitlement.created.unwrap_or(now), e.entitlement.created.is_none())
}

fn eldest<'a>(
    members: impl Iterator<Item = &'a StackedEntitlement>,
    now: DateTime<Utc>,
) -> Option<&'a StackedEntitlement> {
    members.min_by_key(|e| age_key(e, now))
}

fn parse_stack_quantity(raw: &str) -> Option<i64> {
    if raw.eq_ignore_ascii_case(attrs::UNLIMITED) {
        return Some(UNLIMITED_QUANTITY);
    }
    raw.trim().parse::<i64>().ok()
}

/// Union of the members' cached attributes. A member whose pool has a
/// derived product contributes its derived set.
fn stacked_attributes(stack: &[StackedEntitlement]) -> BTreeSet<ProductPoolAttribute> {
    stack
        .iter()
        .flat_map(|m| {
            if m.pool.derived_product.is_some() {
                m.pool.derived_product_attributes.iter()
            } else {
                m.pool.product_attributes.iter()
            }
        })
        .cloned()
        .collect()
}

/// Recompute a stack-derived pool from the live members of its stack.
///
/// `drawn` are the entitlements currently consuming from `pool`; all of them
/// are marked dirty when anything changed. An empty stack is a no-op.
pub fn recompute_stacked_pool<'a>(
    pool: &mut Pool,
    stack: &[StackedEntitlement],
    drawn: impl IntoIterator<Item = &'a mut Entitlement>,
    changed_products: Option<&ChangedProducts>,
    now: DateTime<Utc>,
) -> PoolUpdate {
    let mut update = PoolUpdate::new(pool);

    let Some(eldest_member) = eldest(stack.iter(), now) else {
        debug!(pool_id = ?pool.id, "empty stack, nothing to recompute");
        return update;
    };

    // Single-entitlement / single-subscription links never coexist with a stack.
    if !matches!(pool.source, Some(PoolSource::Stack { .. })) {
        pool.source = eldest_member
            .pool
            .stacking_id()
            .map(|stack_id| PoolSource::Stack {
                consumer_uuid: Some(eldest_member.entitlement.consumer_uuid.clone()),
                stack_id: stack_id.to_string(),
            });
    }

    // 1) Quantity from the eldest virt-limited member, if any
    let with_virt_limit = eldest(
        stack
            .iter()
            .filter(|m| m.pool.has_product_attribute(attrs::VIRT_LIMIT)),
        now,
    );
    if let Some(member) = with_virt_limit {
        let raw = member.pool.product_attribute(attrs::VIRT_LIMIT).unwrap_or_default();
        match parse_stack_quantity(raw) {
            Some(expected) => {
                if let Some(q) = check_quantity(expected, pool) {
                    pool.quantity = q;
                    update.quantity_changed = true;
                }
            }
            None => warn!(
                pool_id = ?pool.id,
                source_pool_id = ?member.pool.id,
                virt_limit = raw,
                "invalid virt_limit on stacked pool, leaving quantity"
            ),
        }
    }

    // 2) Date envelope
    let start = stack.iter().map(|m| m.entitlement.start_date).min();
    let end = stack.iter().map(|m| m.entitlement.end_date).max();
    if let (Some(start), Some(end)) = (start, end) {
        if let Some((s, e)) = check_dates(start, end, pool) {
            pool.start_date = s;
            pool.end_date = e;
            update.dates_changed = true;
        }
    }

    // 3) Identity from the eldest member's pool
    let source = &eldest_member.pool;
    let expected = match &source.derived_product {
        Some(derived) => ProductIdentity {
            product: derived.clone(),
            provided: source.derived_provided_products.clone(),
        },
        None => ProductIdentity {
            product: source.product.clone(),
            provided: source.provided_products.clone(),
        },
    };
    if let Some(next) = check_products(expected, pool, changed_products) {
        next.commit(pool);
        update.products_changed = true;
    }

    // 4) Attributes across the whole stack
    if let Some(next) = diff_attribute_set(&pool.product_attributes, stacked_attributes(stack)) {
        pool.product_attributes = next;
        update.product_attributes_changed = true;
    }

    // 5) Order from the eldest member's pool
    if let Some(next) = check_order(&source.order, pool) {
        pool.order = next;
        update.order_changed = true;
    }

    if update.changed() {
        for ent in drawn {
            ent.dirty = true;
            update.dirty_entitlements += 1;
        }
        debug!(
            pool_id = ?pool.id,
            dirty = update.dirty_entitlements,
            "stacked pool changed, entitlements marked dirty"
        );
    }

    update
}
