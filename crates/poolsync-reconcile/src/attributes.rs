//! Product attribute projection onto pools.
//!
//! A pool keeps a tagged copy of its product's attributes. The copy is
//! replaced wholesale whenever the expected set differs from the cached one,
//! so attributes removed upstream disappear from the pool too.

use std::collections::BTreeSet;

use poolsync_schemas::{Pool, Product, ProductPoolAttribute};

/// One entry per product attribute, tagged with the product id.
pub fn expected_attributes(product: &Product) -> BTreeSet<ProductPoolAttribute> {
    product
        .attributes
        .iter()
        .map(|(name, value)| ProductPoolAttribute::new(&product.id, name, value))
        .collect()
}

/// `Some(expected)` when the cached set must be replaced.
pub(crate) fn diff_attribute_set(
    current: &BTreeSet<ProductPoolAttribute>,
    expected: BTreeSet<ProductPoolAttribute>,
) -> Option<BTreeSet<ProductPoolAttribute>> {
    if *current == expected {
        None
    } else {
        Some(expected)
    }
}

/// Project `product`'s attributes onto the pool's primary attribute cache.
///
/// Returns `true` if the cache was replaced.
pub fn project_product_attributes(product: &Product, pool: &mut Pool) -> bool {
    match diff_attribute_set(&pool.product_attributes, expected_attributes(product)) {
        Some(next) => {
            pool.product_attributes = next;
            true
        }
        None => false,
    }
}

/// Project the derived product's attributes onto the pool's derived cache.
///
/// `None` means the subscription no longer has a derived product: the cache
/// is cleared rather than left stale.
pub fn project_derived_product_attributes(product: Option<&Product>, pool: &mut Pool) -> bool {
    let expected = product.map(expected_attributes).unwrap_or_default();
    match diff_attribute_set(&pool.derived_product_attributes, expected) {
        Some(next) => {
            pool.derived_product_attributes = next;
            true
        }
        None => false,
    }
}
