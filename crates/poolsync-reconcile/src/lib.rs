//! poolsync-reconcile
//!
//! Subscription-to-pool reconciliation engine.
//!
//! - New subscription => master pool (+ optional virt bonus pool)
//! - Existing subscription => per-pool change set, applied in place
//! - Stack-derived pool => identity/dates/quantity/attributes recomputed
//!   from the live stack of entitlements ("eldest wins")
//! - virt_limit removal => tombstone attribute + zero quantity
//!
//! Deterministic, pure logic. No IO, no clock (callers pass `now`), no
//! storage calls except through the [`PoolStore`] capability.

mod attributes;
mod checks;
mod differ;
mod quantity;
mod refresh;
mod stack;
mod synth;
mod types;
mod virt_limit;

pub use attributes::{
    expected_attributes, project_derived_product_attributes, project_product_attributes,
};
pub use differ::{master_exported, update_pools};
pub use quantity::{calculate_quantity, subscription_quantity};
pub use refresh::{
    refresh_snapshot, update_floating_pools, update_pools_from_stacks, PoolStore, RefreshError,
    RefreshReport, SnapshotStore,
};
pub use stack::{recompute_stacked_pool, StackedEntitlement};
pub use synth::{convert_to_master_pool, create_pools};
pub use types::*;
pub use virt_limit::{bonus_quantity, decide_virt_limit, VirtLimit, VirtLimitDecision};
