//! poolsync-config
//!
//! Layered YAML config for the refresh engine:
//! - later documents deep-merge over earlier ones
//! - the merged tree is hashed over its canonical (key-sorted) JSON
//! - keys the engine never reads are reported (see [`report_unused_keys`])
//! - [`EngineSettings`] is the typed view the CLI hands to the engine

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;

mod unused;

pub use unused::{consumed_pointers_for_mode, report_unused_keys, UnusedKeyPolicy, UnusedKeyReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigMode {
    #[default]
    Hosted,
    Standalone,
}

impl ConfigMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigMode::Hosted => "hosted",
            ConfigMode::Standalone => "standalone",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "hosted" => Ok(ConfigMode::Hosted),
            "standalone" => Ok(ConfigMode::Standalone),
            other => bail!("CONFIG_INVALID_MODE: '{other}' (expected hosted|standalone)"),
        }
    }
}

// ---------------------------------------------------------------------------
// Layered loading + hashing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config_hash: String,
    pub canonical_json: String,
    pub config_json: Value,
}

pub fn load_layered_yaml(paths: &[&str]) -> Result<LoadedConfig> {
    let docs = paths
        .iter()
        .map(|p| fs::read_to_string(p).with_context(|| format!("failed to read yaml path: {p}")))
        .collect::<Result<Vec<String>>>()?;

    let doc_refs: Vec<&str> = docs.iter().map(String::as_str).collect();
    load_layered_yaml_from_strings(&doc_refs)
}

pub fn load_layered_yaml_from_strings(yaml_docs: &[&str]) -> Result<LoadedConfig> {
    let mut merged = Value::Object(Map::new());

    for (layer, raw) in yaml_docs.iter().enumerate() {
        let doc: serde_yaml::Value =
            serde_yaml::from_str(raw).with_context(|| format!("invalid yaml in layer {layer}"))?;
        // A null document (`~`) is an empty layer.
        if doc.is_null() {
            continue;
        }
        let doc: Value = serde_json::to_value(doc)
            .with_context(|| format!("layer {layer} is not representable as json"))?;
        merge_into(&mut merged, doc);
    }

    // serde_json's Map is BTreeMap-backed (no preserve_order), so keys
    // serialize sorted.
    let canonical_json = serde_json::to_string(&merged).context("canonical json serialize failed")?;
    let config_hash = hex::encode(Sha256::digest(canonical_json.as_bytes()));

    Ok(LoadedConfig {
        config_hash,
        canonical_json,
        config_json: merged,
    })
}

/// Objects merge key by key; any other value in `over` replaces `base`.
fn merge_into(base: &mut Value, over: Value) {
    match (base, over) {
        (Value::Object(base_map), Value::Object(over_map)) => {
            for (key, value) in over_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

// ---------------------------------------------------------------------------
// Typed settings
// ---------------------------------------------------------------------------

/// Settings the refresh engine and CLI read from the merged config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub mode: ConfigMode,
    pub log_level: String,
    pub report_unchanged: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            mode: ConfigMode::Hosted,
            log_level: "info".to_string(),
            report_unchanged: false,
        }
    }
}

impl EngineSettings {
    /// Extract settings; missing keys take defaults, wrong types are errors.
    pub fn from_config_json(config_json: &Value) -> Result<Self> {
        let mut s = Self::default();

        if let Some(raw) = string_at(config_json, "/engine/mode")? {
            s.mode = ConfigMode::parse(raw)?;
        }
        if let Some(raw) = string_at(config_json, "/logging/level")? {
            s.log_level = raw.trim().to_string();
        }
        if let Some(v) = config_json.pointer("/refresh/report_unchanged") {
            s.report_unchanged = v.as_bool().with_context(|| {
                format!("CONFIG_TYPE_ERROR: /refresh/report_unchanged must be a bool, got {v}")
            })?;
        }

        Ok(s)
    }

    pub fn is_standalone(&self) -> bool {
        self.mode == ConfigMode::Standalone
    }
}

fn string_at<'a>(config_json: &'a Value, pointer: &str) -> Result<Option<&'a str>> {
    match config_json.pointer(pointer) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(Some)
            .with_context(|| format!("CONFIG_TYPE_ERROR: {pointer} must be a string, got {v}")),
    }
}
