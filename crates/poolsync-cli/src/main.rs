use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "poolsync")]
#[command(about = "Subscription to pool reconciliation CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run one refresh cycle over a JSON snapshot and print the report
    Refresh {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Snapshot file (subscriptions, pools, entitlements)
        #[arg(long)]
        snapshot: String,

        /// Write the refreshed snapshot here
        #[arg(long)]
        out: Option<String>,
    },
}

fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            commands::init_tracing(None);
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = poolsync_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Refresh {
            config_paths,
            snapshot,
            out,
        } => {
            let report = commands::refresh::run(&config_paths, &snapshot, out.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
