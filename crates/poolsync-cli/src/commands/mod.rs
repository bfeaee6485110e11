//! Command handler modules for poolsync-cli.
//!
//! Shared utilities used by multiple command paths live here.
//! Command-specific logic lives in the submodules.

pub mod refresh;

use poolsync_config::ConfigMode;
use poolsync_reconcile::{EngineMode, RulesConfig};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Install the stderr subscriber.
///
/// `RUST_LOG` wins, then the configured level, then `info`.
pub fn init_tracing(configured_level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .ok()
        .or_else(|| configured_level.and_then(|lvl| EnvFilter::try_new(lvl).ok()))
        .unwrap_or_else(|| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Map the config-layer mode onto the engine's policy knobs.
pub fn rules_for_mode(mode: ConfigMode) -> RulesConfig {
    let mode = match mode {
        ConfigMode::Hosted => EngineMode::Hosted,
        ConfigMode::Standalone => EngineMode::Standalone,
    };
    RulesConfig { mode }
}
