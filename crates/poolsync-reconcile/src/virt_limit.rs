//! virt_limit policy: bonus pool sizing and removal detection.

use poolsync_schemas::{attrs, Pool, Subscription, UNLIMITED_QUANTITY};
use tracing::warn;

use crate::RulesConfig;

/// Parsed `virt_limit` value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtLimit {
    Unlimited,
    Limit(i64),
    Malformed,
}

impl VirtLimit {
    pub fn parse(raw: &str) -> Self {
        if raw == attrs::UNLIMITED {
            return VirtLimit::Unlimited;
        }
        match raw.trim().parse::<i64>() {
            Ok(n) => VirtLimit::Limit(n),
            Err(_) => VirtLimit::Malformed,
        }
    }
}

/// Quantity of a freshly created bonus pool, or `None` if no bonus pool
/// should exist for this limit.
///
/// An unlimited master pool yields an unlimited bonus pool whatever the limit.
pub fn bonus_quantity(virt_limit: Option<&str>, master_quantity: i64) -> Option<i64> {
    let raw = virt_limit?;
    match VirtLimit::parse(raw) {
        VirtLimit::Unlimited => Some(UNLIMITED_QUANTITY),
        _ if master_quantity == UNLIMITED_QUANTITY => Some(UNLIMITED_QUANTITY),
        VirtLimit::Limit(l) if l > 0 => Some(l.saturating_mul(master_quantity)),
        VirtLimit::Limit(_) => None,
        VirtLimit::Malformed => {
            warn!(virt_limit = raw, "invalid virt_limit attribute, no bonus pool");
            None
        }
    }
}

/// Outcome of the virt_limit rule for one existing pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VirtLimitDecision {
    /// Pool is not a virt-limited bonus pool; base quantity stands.
    NotApplicable,
    /// virt_limit was removed from the subscription: tombstone, quantity 0.
    Tombstone,
    Quantity(i64),
    /// Unparseable virt_limit; base quantity stands.
    Malformed,
}

impl VirtLimitDecision {
    pub fn expected_quantity(&self, base: i64) -> i64 {
        match self {
            VirtLimitDecision::NotApplicable | VirtLimitDecision::Malformed => base,
            VirtLimitDecision::Tombstone => 0,
            VirtLimitDecision::Quantity(q) => *q,
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, VirtLimitDecision::Tombstone)
    }
}

fn is_virt_limited_bonus(pool: &Pool) -> bool {
    pool.is_derived()
        && pool.is_virt_only()
        && (pool.has_attribute(attrs::VIRT_LIMIT) || pool.has_product_attribute(attrs::VIRT_LIMIT))
}

/// Decide the expected quantity of `pool` under the subscription's virt_limit.
///
/// - `base` is the subscription quantity after multipliers
/// - `master_exported` is the `exported` counter of the group's master pool
///   (the sibling without `pool_derived`), `None` when there is none
pub fn decide_virt_limit(
    cfg: &RulesConfig,
    sub: &Subscription,
    pool: &Pool,
    base: i64,
    master_exported: Option<i64>,
) -> VirtLimitDecision {
    if !is_virt_limited_bonus(pool) {
        return VirtLimitDecision::NotApplicable;
    }

    let Some(raw) = sub.product.attribute(attrs::VIRT_LIMIT) else {
        return VirtLimitDecision::Tombstone;
    };

    match VirtLimit::parse(raw) {
        // A pool explicitly zeroed stays at zero.
        VirtLimit::Unlimited => VirtLimitDecision::Quantity(if pool.quantity == 0 {
            0
        } else {
            UNLIMITED_QUANTITY
        }),
        VirtLimit::Limit(l) => {
            if cfg.is_standalone() && !pool.is_unmapped_guests_only() {
                VirtLimitDecision::Quantity(l)
            } else if base == UNLIMITED_QUANTITY {
                VirtLimitDecision::Quantity(UNLIMITED_QUANTITY)
            } else {
                let adjust = master_exported.unwrap_or(0);
                VirtLimitDecision::Quantity(base.saturating_sub(adjust).saturating_mul(l))
            }
        }
        VirtLimit::Malformed => {
            warn!(
                pool_id = ?pool.id,
                subscription_id = %sub.id,
                virt_limit = raw,
                "invalid virt_limit attribute, leaving quantity rule unapplied"
            );
            VirtLimitDecision::Malformed
        }
    }
}
