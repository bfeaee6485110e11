//! `poolsync refresh`: one reconciliation cycle over a snapshot file.

use anyhow::{Context, Result};
use chrono::Utc;
use poolsync_config::{report_unused_keys, EngineSettings, UnusedKeyPolicy};
use poolsync_reconcile::{refresh_snapshot, RefreshReport};
use poolsync_schemas::RefreshSnapshot;
use std::fs;
use tracing::{info, warn};

use super::{init_tracing, rules_for_mode};

pub fn run(config_paths: &[String], snapshot_path: &str, out: Option<&str>) -> Result<RefreshReport> {
    // 1) Config first: it carries the log level.
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = poolsync_config::load_layered_yaml(&path_refs)?;
    let settings = EngineSettings::from_config_json(&loaded.config_json)?;

    init_tracing(Some(&settings.log_level));

    let unused = report_unused_keys(settings.mode, &loaded.config_json, UnusedKeyPolicy::Warn)?;
    if !unused.is_clean() {
        warn!(
            mode = unused.mode.as_str(),
            unused = ?unused.unused_leaf_pointers,
            "config carries keys the engine does not read"
        );
    }

    // 2) Snapshot.
    let raw = fs::read_to_string(snapshot_path)
        .with_context(|| format!("read snapshot: {snapshot_path}"))?;
    let mut snapshot: RefreshSnapshot =
        serde_json::from_str(&raw).context("snapshot must be a valid RefreshSnapshot JSON")?;

    info!(
        config_hash = %loaded.config_hash,
        mode = settings.mode.as_str(),
        subscriptions = snapshot.subscriptions.len(),
        pools = snapshot.pools.len(),
        "refresh starting"
    );

    // 3) Refresh.
    let cfg = rules_for_mode(settings.mode);
    let mut report = refresh_snapshot(&cfg, &mut snapshot, None, Utc::now())
        .context("REFRESH_REJECTED")?;

    if !settings.report_unchanged {
        report.retain_changed();
    }

    // 4) Persist.
    if let Some(path) = out {
        let s = serde_json::to_string_pretty(&snapshot).context("serialize snapshot")?;
        fs::write(path, s).with_context(|| format!("write snapshot: {path}"))?;
    }

    Ok(report)
}
