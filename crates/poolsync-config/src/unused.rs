//! Unused-key guard.
//!
//! A config leaf is "consumed" when its JSON pointer equals, or sits below,
//! one of the prefixes registered for the mode. Everything else is reported
//! so stale or misspelled keys do not silently do nothing.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

use crate::ConfigMode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnusedKeyPolicy {
    Warn,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnusedKeyReport {
    pub mode: String,
    /// Registered prefixes, normalized, sorted.
    pub consumed_prefixes: Vec<String>,
    /// Leaves no prefix covers, sorted.
    pub unused_leaf_pointers: Vec<String>,
}

impl UnusedKeyReport {
    pub fn is_clean(&self) -> bool {
        self.unused_leaf_pointers.is_empty()
    }
}

/// Prefixes read by [`crate::EngineSettings::from_config_json`].
pub fn consumed_pointers_for_mode(mode: ConfigMode) -> &'static [&'static str] {
    // Both modes read the same keys today.
    match mode {
        ConfigMode::Hosted | ConfigMode::Standalone => &[
            "/engine/mode",
            "/logging/level",
            "/refresh/report_unchanged",
        ],
    }
}

/// Build the report; with [`UnusedKeyPolicy::Fail`] a non-clean report is an
/// error instead.
pub fn report_unused_keys(
    mode: ConfigMode,
    config_json: &Value,
    policy: UnusedKeyPolicy,
) -> Result<UnusedKeyReport> {
    let consumed: BTreeSet<String> = consumed_pointers_for_mode(mode)
        .iter()
        .map(|p| normalize_pointer(p))
        .collect();

    let mut leaves = BTreeSet::new();
    walk_leaves(config_json, String::new(), &mut leaves);

    let unused: Vec<String> = leaves
        .into_iter()
        .filter(|leaf| !consumed.iter().any(|prefix| covers(prefix, leaf)))
        .collect();

    let report = UnusedKeyReport {
        mode: mode.as_str().to_string(),
        consumed_prefixes: consumed.into_iter().collect(),
        unused_leaf_pointers: unused,
    };

    if policy == UnusedKeyPolicy::Fail && !report.is_clean() {
        let shown: Vec<&str> = report
            .unused_leaf_pointers
            .iter()
            .take(12)
            .map(String::as_str)
            .collect();
        bail!(
            "CONFIG_UNUSED_KEYS (mode={}): {} key(s) not read by the engine: {:?}",
            report.mode,
            report.unused_leaf_pointers.len(),
            shown
        );
    }

    Ok(report)
}

/// Leading slash, no trailing slash (`""` becomes `"/"`).
fn normalize_pointer(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    format!("/{trimmed}")
}

/// `"/a/b"` covers `"/a/b"` and `"/a/b/c"`, not `"/a/bc"`; `"/"` covers all.
fn covers(prefix: &str, leaf: &str) -> bool {
    if prefix == "/" {
        return true;
    }
    match leaf.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

fn walk_leaves(v: &Value, at: String, out: &mut BTreeSet<String>) {
    match v {
        Value::Object(map) => {
            for (key, child) in map {
                let token = key.replace('~', "~0").replace('/', "~1");
                walk_leaves(child, format!("{at}/{token}"), out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                walk_leaves(child, format!("{at}/{i}"), out);
            }
        }
        _ if at.is_empty() => {
            out.insert("/".to_string());
        }
        _ => {
            out.insert(at);
        }
    }
}
