use std::collections::BTreeSet;

use poolsync_schemas::Pool;
use serde::{Deserialize, Serialize};

/// Deployment role of the engine.
///
/// Hosted is authoritative: it applies instance multipliers and creates virt
/// bonus pools. Standalone replays quantities already adjusted upstream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineMode {
    #[default]
    Hosted,
    Standalone,
}

impl EngineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineMode::Hosted => "hosted",
            EngineMode::Standalone => "standalone",
        }
    }
}

/// Engine policy knobs.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RulesConfig {
    pub mode: EngineMode,
}

impl RulesConfig {
    pub fn hosted() -> Self {
        Self {
            mode: EngineMode::Hosted,
        }
    }

    pub fn standalone() -> Self {
        Self {
            mode: EngineMode::Standalone,
        }
    }

    pub fn is_standalone(&self) -> bool {
        self.mode == EngineMode::Standalone
    }
}

/// Product ids known to have changed upstream since the last refresh.
///
/// A pool whose product is listed is reported as `products_changed` even if
/// its id, name and provided set still match.
pub type ChangedProducts = BTreeSet<String>;

/// What the engine changed on one pool.
///
/// Every `true` flag corresponds to a field that was already written to the
/// pool when this record was returned; this is not a dry run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolUpdate {
    pub pool_id: Option<String>,
    pub dates_changed: bool,
    pub quantity_changed: bool,
    pub products_changed: bool,
    pub derived_products_changed: bool,
    pub product_attributes_changed: bool,
    pub derived_product_attributes_changed: bool,
    pub order_changed: bool,
    pub branding_changed: bool,
    /// Entitlements drawn from this pool that were flagged for certificate
    /// regeneration (stack-derived pools only).
    #[serde(default)]
    pub dirty_entitlements: usize,
}

impl PoolUpdate {
    pub fn new(pool: &Pool) -> Self {
        Self {
            pool_id: pool.id.clone(),
            ..Self::default()
        }
    }

    pub fn changed(&self) -> bool {
        self.dates_changed
            || self.quantity_changed
            || self.products_changed
            || self.derived_products_changed
            || self.product_attributes_changed
            || self.derived_product_attributes_changed
            || self.order_changed
            || self.branding_changed
    }
}
