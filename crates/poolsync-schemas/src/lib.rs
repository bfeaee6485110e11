//! poolsync-schemas
//!
//! Record shapes shared by the pool reconciliation engine, its config layer
//! and the CLI. Plain data with serde derives; the only behavior here is
//! attribute lookup and source classification.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Well-known attribute names (product-level and pool-level).
pub mod attrs {
    pub const VIRT_LIMIT: &str = "virt_limit";
    pub const VIRT_ONLY: &str = "virt_only";
    pub const PHYSICAL_ONLY: &str = "physical_only";
    pub const HOST_LIMITED: &str = "host_limited";
    pub const INSTANCE_MULTIPLIER: &str = "instance_multiplier";
    /// Stack membership. Product data uses `stacking_id`; `stack_id` is
    /// accepted as an alias when the primary name is absent.
    pub const STACKING_ID: &str = "stacking_id";
    pub const STACK_ID: &str = "stack_id";

    /// Pool created by the engine from another pool (bonus, stack or entitlement derived).
    pub const POOL_DERIVED: &str = "pool_derived";
    pub const UNMAPPED_GUESTS_ONLY: &str = "unmapped_guests_only";
    pub const DEV_POOL: &str = "dev_pool";

    /// Tombstone understood by the storage layer: stop serving this pool.
    pub const DELETE_FLAG: &str = "candlepin.delete_pool";

    /// `virt_limit` value meaning "no cap".
    pub const UNLIMITED: &str = "unlimited";
}

/// Quantity sentinel for "unlimited".
pub const UNLIMITED_QUANTITY: i64 = -1;

fn default_multiplier() -> i64 {
    1
}

fn is_true(v: Option<&str>) -> bool {
    v.map(|s| s.eq_ignore_ascii_case("true")).unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

/// A product definition: identity, multiplier and its attribute map.
///
/// Attributes here are the source of truth; pools only keep tagged copies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default = "default_multiplier")]
    pub multiplier: i64,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Product {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            multiplier: 1,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_multiplier(mut self, multiplier: i64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn to_ref(&self) -> ProductRef {
        ProductRef::new(&self.id, &self.name)
    }
}

/// Product identity as stored on a pool (and in provided-product sets).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductRef {
    pub id: String,
    pub name: String,
}

impl ProductRef {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// A product attribute copied onto a pool, tagged with the product it came from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProductPoolAttribute {
    pub product_id: String,
    pub name: String,
    pub value: String,
}

impl ProductPoolAttribute {
    pub fn new(
        product_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Branding {
    pub product_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
}

impl Branding {
    pub fn new(
        product_id: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            kind: kind.into(),
            name: name.into(),
        }
    }
}

/// Contract / account / order numbers. Compared and replaced as one unit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderInfo {
    #[serde(default)]
    pub contract_number: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub order_number: Option<String>,
}

/// Upstream linkage carried by manifest-imported subscriptions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamInfo {
    #[serde(default)]
    pub pool_id: Option<String>,
    #[serde(default)]
    pub entitlement_id: Option<String>,
    #[serde(default)]
    pub consumer_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// An agreement granting `quantity` of `product` for a date range.
///
/// Immutable input for one refresh cycle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub product: Product,
    #[serde(default)]
    pub derived_product: Option<Product>,
    #[serde(default)]
    pub provided_products: BTreeSet<ProductRef>,
    #[serde(default)]
    pub derived_provided_products: BTreeSet<ProductRef>,
    /// Negative means unlimited.
    pub quantity: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(flatten)]
    pub order: OrderInfo,
    #[serde(default)]
    pub branding: BTreeSet<Branding>,
    /// Set when the subscription was imported from an upstream (hosted) pool.
    #[serde(default)]
    pub upstream: UpstreamInfo,
}

impl Subscription {
    pub fn upstream_pool_id(&self) -> Option<&str> {
        self.upstream.pool_id.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Sub-key distinguishing the two pools a subscription can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubKey {
    Master,
    Derived,
}

impl SubKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubKey::Master => "master",
            SubKey::Derived => "derived",
        }
    }
}

/// What a pool was created from. A pool has at most one source.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PoolSource {
    Subscription {
        subscription_id: String,
        sub_key: SubKey,
    },
    Entitlement {
        entitlement_id: String,
    },
    Stack {
        /// `None` only for corrupt records; refresh skips those pools.
        #[serde(default)]
        consumer_uuid: Option<String>,
        stack_id: String,
    },
}

/// A consumable allotment of entitlements.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    /// `None` until the storage layer persists the pool.
    #[serde(default)]
    pub id: Option<String>,
    pub product: ProductRef,
    #[serde(default)]
    pub derived_product: Option<ProductRef>,
    #[serde(default)]
    pub provided_products: BTreeSet<ProductRef>,
    #[serde(default)]
    pub derived_provided_products: BTreeSet<ProductRef>,
    /// `-1` is unlimited.
    pub quantity: i64,
    #[serde(default)]
    pub exported: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(flatten)]
    pub order: OrderInfo,
    #[serde(default)]
    pub branding: BTreeSet<Branding>,
    /// Pool-level attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Cached copy of the product's attributes.
    #[serde(default)]
    pub product_attributes: BTreeSet<ProductPoolAttribute>,
    /// Cached copy of the derived product's attributes.
    #[serde(default)]
    pub derived_product_attributes: BTreeSet<ProductPoolAttribute>,
    #[serde(default)]
    pub source: Option<PoolSource>,
    #[serde(default)]
    pub upstream: UpstreamInfo,
}

impl Pool {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// First cached product attribute with this name.
    pub fn product_attribute(&self, name: &str) -> Option<&str> {
        self.product_attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn has_product_attribute(&self, name: &str) -> bool {
        self.product_attribute(name).is_some()
    }

    /// Carries `pool_derived` (any value).
    pub fn is_derived(&self) -> bool {
        self.has_attribute(attrs::POOL_DERIVED)
    }

    pub fn is_virt_only(&self) -> bool {
        is_true(self.attribute(attrs::VIRT_ONLY))
    }

    pub fn is_unmapped_guests_only(&self) -> bool {
        is_true(self.attribute(attrs::UNMAPPED_GUESTS_ONLY))
    }

    pub fn is_development(&self) -> bool {
        is_true(self.attribute(attrs::DEV_POOL))
    }

    pub fn is_marked_for_delete(&self) -> bool {
        is_true(self.attribute(attrs::DELETE_FLAG))
    }

    /// Non-empty `stacking_id` (or `stack_id`) product attribute, if any.
    pub fn stacking_id(&self) -> Option<&str> {
        self.product_attribute(attrs::STACKING_ID)
            .or_else(|| self.product_attribute(attrs::STACK_ID))
            .filter(|s| !s.is_empty())
    }

    pub fn subscription_id(&self) -> Option<&str> {
        match &self.source {
            Some(PoolSource::Subscription {
                subscription_id, ..
            }) => Some(subscription_id),
            _ => None,
        }
    }

    pub fn sub_key(&self) -> Option<SubKey> {
        match &self.source {
            Some(PoolSource::Subscription { sub_key, .. }) => Some(*sub_key),
            _ => None,
        }
    }

    /// `(consumer, stack id)` for stack-derived pools.
    pub fn source_stack(&self) -> Option<(Option<&str>, &str)> {
        match &self.source {
            Some(PoolSource::Stack {
                consumer_uuid,
                stack_id,
            }) => Some((consumer_uuid.as_deref(), stack_id.as_str())),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entitlement
// ---------------------------------------------------------------------------

/// A grant consumed from a pool by a consumer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    #[serde(default)]
    pub id: Option<String>,
    pub consumer_uuid: String,
    pub pool_id: String,
    #[serde(default = "default_multiplier")]
    pub quantity: i64,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    /// `None` until persisted.
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Certificate must be regenerated on next check-in.
    #[serde(default)]
    pub dirty: bool,
}

// ---------------------------------------------------------------------------
// Refresh snapshot
// ---------------------------------------------------------------------------

/// Everything one owner's refresh cycle reads and writes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSnapshot {
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
    #[serde(default)]
    pub pools: Vec<Pool>,
    #[serde(default)]
    pub entitlements: Vec<Entitlement>,
}
