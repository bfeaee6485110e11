//! Field-group comparisons shared by the subscription differ and the stack
//! recomputer.
//!
//! Each check reads the pool and returns `Some(next)` when the group must be
//! rewritten; the caller commits `next` and raises the matching flag.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use poolsync_schemas::{Branding, OrderInfo, Pool, ProductRef};

use crate::ChangedProducts;

/// Product id/name plus the provided set, replaced as one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ProductIdentity {
    pub product: ProductRef,
    pub provided: BTreeSet<ProductRef>,
}

/// Derived product id/name plus the derived provided set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct DerivedIdentity {
    pub product: Option<ProductRef>,
    pub provided: BTreeSet<ProductRef>,
}

pub(crate) fn check_dates(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    pool: &Pool,
) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    if pool.start_date != start || pool.end_date != end {
        Some((start, end))
    } else {
        None
    }
}

pub(crate) fn check_quantity(expected: i64, pool: &Pool) -> Option<i64> {
    (pool.quantity != expected).then_some(expected)
}

pub(crate) fn check_products(
    expected: ProductIdentity,
    pool: &Pool,
    changed_products: Option<&ChangedProducts>,
) -> Option<ProductIdentity> {
    let listed = changed_products
        .map(|set| set.contains(&pool.product.id))
        .unwrap_or(false);

    if listed || pool.product != expected.product || pool.provided_products != expected.provided {
        Some(expected)
    } else {
        None
    }
}

pub(crate) fn check_derived_products(
    expected: DerivedIdentity,
    pool: &Pool,
) -> Option<DerivedIdentity> {
    if pool.derived_product != expected.product
        || pool.derived_provided_products != expected.provided
    {
        Some(expected)
    } else {
        None
    }
}

/// Contract, account and order numbers differ in any component.
pub(crate) fn check_order(expected: &OrderInfo, pool: &Pool) -> Option<OrderInfo> {
    (pool.order != *expected).then(|| expected.clone())
}

/// Size + membership comparison; the pool converges to exactly `expected`.
pub(crate) fn check_branding(
    expected: &BTreeSet<Branding>,
    pool: &Pool,
) -> Option<BTreeSet<Branding>> {
    if pool.branding.len() != expected.len() || !expected.iter().all(|b| pool.branding.contains(b))
    {
        Some(expected.clone())
    } else {
        None
    }
}

impl ProductIdentity {
    pub(crate) fn commit(self, pool: &mut Pool) {
        pool.product = self.product;
        pool.provided_products = self.provided;
    }
}

impl DerivedIdentity {
    pub(crate) fn commit(self, pool: &mut Pool) {
        pool.derived_product = self.product;
        pool.derived_provided_products = self.provided;
    }
}
