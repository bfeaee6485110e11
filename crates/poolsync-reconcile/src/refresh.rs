//! Refresh drivers: floating stack pools, batch stack refresh and a full
//! refresh cycle over an in-memory snapshot.
//!
//! - Storage is reached only through [`PoolStore`]; the engine never queries
//!   anything on its own.
//! - [`SnapshotStore`] is the in-memory store used by [`refresh_snapshot`]
//!   and by tests.
//! - Snapshot inconsistencies surface as [`RefreshError`]; callers decide
//!   whether to abort or repair the snapshot.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use poolsync_schemas::{Entitlement, Pool, RefreshSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::stack::{recompute_stacked_pool, StackedEntitlement};
use crate::{create_pools, update_pools, ChangedProducts, PoolUpdate, RulesConfig};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    /// An entitlement draws from a pool the snapshot does not contain.
    UnknownPool {
        entitlement_id: Option<String>,
        pool_id: String,
    },
    /// Two pools share one id.
    DuplicatePoolId(String),
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownPool {
                entitlement_id,
                pool_id,
            } => write!(
                f,
                "entitlement {:?} references unknown pool '{pool_id}'",
                entitlement_id
            ),
            Self::DuplicatePoolId(id) => write!(f, "duplicate pool id '{id}' in snapshot"),
        }
    }
}

impl std::error::Error for RefreshError {}

// ---------------------------------------------------------------------------
// Store capability
// ---------------------------------------------------------------------------

/// Storage lookups the stack refresh depends on.
pub trait PoolStore {
    /// Live entitlements of `consumer_uuid` whose pool declares `stack_id`.
    fn find_by_stack_id(&self, consumer_uuid: &str, stack_id: &str) -> Vec<StackedEntitlement>;

    /// Same as [`PoolStore::find_by_stack_id`] for several stacks in one call.
    fn find_by_stack_ids(
        &self,
        consumer_uuid: &str,
        stack_ids: &BTreeSet<String>,
    ) -> Vec<StackedEntitlement> {
        stack_ids
            .iter()
            .flat_map(|id| self.find_by_stack_id(consumer_uuid, id))
            .collect()
    }

    /// Entitlements currently drawn from `pool_id`, for dirty marking.
    fn entitlements_from_pool(&mut self, pool_id: &str) -> Vec<&mut Entitlement>;
}

fn recompute_with_store<S: PoolStore>(
    pool: &mut Pool,
    stack: &[StackedEntitlement],
    store: &mut S,
    changed_products: Option<&ChangedProducts>,
    now: DateTime<Utc>,
) -> PoolUpdate {
    let drawn = match pool.id.clone() {
        Some(id) => store.entitlements_from_pool(&id),
        None => Vec::new(),
    };
    recompute_stacked_pool(pool, stack, drawn, changed_products, now)
}

/// Refresh pools that are not tied to a subscription.
///
/// Development pools and pools without a stack source are left alone. Only
/// updates that changed something are returned.
pub fn update_floating_pools<S: PoolStore>(
    pools: &mut [Pool],
    store: &mut S,
    changed_products: Option<&ChangedProducts>,
    now: DateTime<Utc>,
) -> Vec<PoolUpdate> {
    let mut updates = Vec::new();

    for pool in pools.iter_mut() {
        if pool.subscription_id().is_some() || pool.is_development() {
            continue;
        }

        let (consumer, stack_id) = match pool.source_stack() {
            None => continue,
            Some((None, _)) => {
                error!(pool_id = ?pool.id, "stack derived pool has no source consumer");
                continue;
            }
            Some((Some(c), s)) => (c.to_string(), s.to_string()),
        };

        let stack = store.find_by_stack_id(&consumer, &stack_id);
        let update = recompute_with_store(pool, &stack, store, changed_products, now);
        if update.changed() {
            updates.push(update);
        }
    }

    updates
}

/// Refresh every stack-derived pool of one consumer, fetching all stacks in a
/// single store call.
pub fn update_pools_from_stacks<S: PoolStore>(
    consumer_uuid: &str,
    pools: &mut [Pool],
    store: &mut S,
    changed_products: Option<&ChangedProducts>,
    now: DateTime<Utc>,
) -> Vec<PoolUpdate> {
    let stack_ids: BTreeSet<String> = pools
        .iter()
        .filter_map(|p| match p.source_stack() {
            Some((Some(c), s)) if c == consumer_uuid => Some(s.to_string()),
            _ => None,
        })
        .collect();

    if stack_ids.is_empty() {
        return Vec::new();
    }

    let mut by_stack: BTreeMap<String, Vec<StackedEntitlement>> = BTreeMap::new();
    for member in store.find_by_stack_ids(consumer_uuid, &stack_ids) {
        if let Some(id) = member.pool.stacking_id() {
            by_stack.entry(id.to_string()).or_default().push(member);
        }
    }

    let mut updates = Vec::new();
    for pool in pools.iter_mut() {
        let stack_id = match pool.source_stack() {
            Some((Some(c), s)) if c == consumer_uuid => s.to_string(),
            _ => continue,
        };
        let stack = by_stack.get(&stack_id).map(Vec::as_slice).unwrap_or(&[]);
        let update = recompute_with_store(pool, stack, store, changed_products, now);
        if update.changed() {
            updates.push(update);
        }
    }

    updates
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// [`PoolStore`] over a snapshot's pools and entitlements.
///
/// Pools are indexed by id at construction; entitlements are borrowed so
/// dirty marks land in the caller's records.
pub struct SnapshotStore<'a> {
    pools: BTreeMap<String, Pool>,
    entitlements: &'a mut [Entitlement],
}

impl<'a> SnapshotStore<'a> {
    pub fn new(pools: &[Pool], entitlements: &'a mut [Entitlement]) -> Self {
        let pools = pools
            .iter()
            .filter_map(|p| p.id.clone().map(|id| (id, p.clone())))
            .collect();
        Self {
            pools,
            entitlements,
        }
    }
}

impl PoolStore for SnapshotStore<'_> {
    fn find_by_stack_id(&self, consumer_uuid: &str, stack_id: &str) -> Vec<StackedEntitlement> {
        self.entitlements
            .iter()
            .filter(|e| e.consumer_uuid == consumer_uuid)
            .filter_map(|e| {
                let pool = self.pools.get(&e.pool_id)?;
                // Entitlements from the stack pool itself are not stack members.
                if pool.source_stack().is_some() || pool.stacking_id() != Some(stack_id) {
                    return None;
                }
                Some(StackedEntitlement {
                    entitlement: e.clone(),
                    pool: pool.clone(),
                })
            })
            .collect()
    }

    fn entitlements_from_pool(&mut self, pool_id: &str) -> Vec<&mut Entitlement> {
        self.entitlements
            .iter_mut()
            .filter(|e| e.pool_id == pool_id)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Snapshot refresh cycle
// ---------------------------------------------------------------------------

/// Outcome of one [`refresh_snapshot`] run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshReport {
    pub created_pool_ids: Vec<String>,
    pub updates: Vec<PoolUpdate>,
    pub dirty_entitlements: usize,
}

impl RefreshReport {
    pub fn changed_count(&self) -> usize {
        self.updates.iter().filter(|u| u.changed()).count()
    }

    /// Drop updates that did not change anything.
    pub fn retain_changed(&mut self) {
        self.updates.retain(PoolUpdate::changed);
    }
}

fn validate(snapshot: &RefreshSnapshot) -> Result<(), RefreshError> {
    let mut ids = BTreeSet::new();
    for id in snapshot.pools.iter().filter_map(|p| p.id.as_deref()) {
        if !ids.insert(id) {
            return Err(RefreshError::DuplicatePoolId(id.to_string()));
        }
    }
    for e in &snapshot.entitlements {
        if !ids.contains(e.pool_id.as_str()) {
            return Err(RefreshError::UnknownPool {
                entitlement_id: e.id.clone(),
                pool_id: e.pool_id.clone(),
            });
        }
    }
    Ok(())
}

/// One refresh cycle for one owner.
///
/// 1) each subscription: diff its existing pools, then create missing pools
/// 2) floating stack pools: recompute against the snapshot's entitlements
///
/// Updates are returned for every subscription pool visited and for every
/// floating pool that changed.
pub fn refresh_snapshot(
    cfg: &RulesConfig,
    snapshot: &mut RefreshSnapshot,
    changed_products: Option<&ChangedProducts>,
    now: DateTime<Utc>,
) -> Result<RefreshReport, RefreshError> {
    validate(snapshot)?;

    let RefreshSnapshot {
        subscriptions,
        pools,
        entitlements,
    } = snapshot;
    let mut report = RefreshReport::default();

    // 1) Subscription pools
    for sub in subscriptions.iter() {
        let idx: Vec<usize> = pools
            .iter()
            .enumerate()
            .filter(|(_, p)| p.subscription_id() == Some(sub.id.as_str()))
            .map(|(i, _)| i)
            .collect();

        let mut group: Vec<Pool> = idx.iter().map(|&i| pools[i].clone()).collect();
        report
            .updates
            .extend(update_pools(cfg, sub, &mut group, changed_products));

        let created = create_pools(cfg, sub, &group);
        for (i, pool) in idx.into_iter().zip(group) {
            pools[i] = pool;
        }

        for mut pool in created {
            let id = Uuid::new_v4().to_string();
            debug!(subscription_id = %sub.id, pool_id = %id, "inserting pool");
            pool.id = Some(id.clone());
            pools.push(pool);
            report.created_pool_ids.push(id);
        }
    }

    // 2) Floating stack pools
    let mut store = SnapshotStore::new(pools, entitlements);
    report
        .updates
        .extend(update_floating_pools(pools, &mut store, changed_products, now));

    report.dirty_entitlements = report.updates.iter().map(|u| u.dirty_entitlements).sum();

    info!(
        subscriptions = subscriptions.len(),
        created = report.created_pool_ids.len(),
        changed = report.changed_count(),
        dirty = report.dirty_entitlements,
        "refresh complete"
    );

    Ok(report)
}
