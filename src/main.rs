//! # Clone Monitor CLI (`monitor`)
//!
//! ## Usage
//!
//! ```bash
//! monitor --config ./config/monitor.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `monitor init` | Create the store file and one table per collection |
//! | `monitor sample` | Poll the store and write the series and status log |
//! | `monitor stats` | Print derived statistics (`--json` for machine output) |
//! | `monitor contents` | Document count per collection |
//! | `monitor status` | Latest status updates |
//! | `monitor serve` | Start the read-only JSON API |
//!
//! The config file is optional. `DBHOST`, `DBNAME` and `SAMPLE_INTERVAL`
//! override it, and `RUST_LOG` controls log verbosity.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use clone_monitor::{config, inspect, logging, migrate, sampler, server, stats};

/// Clone Monitor: records the progress of a clone-detection pipeline.
#[derive(Parser)]
#[command(
    name = "monitor",
    about = "Clone Monitor: samples a clone-detection pipeline's store into a time series",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/monitor.toml`. Built-in defaults apply when the
    /// file does not exist.
    #[arg(long, global = true, default_value = "./config/monitor.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store with the expected collections.
    ///
    /// Idempotent; safe to run against a live pipeline database.
    Init,

    /// Sample the store until interrupted.
    ///
    /// Truncates the series file and status log, waits for the store to
    /// become reachable, then writes one row per interval.
    Sample,

    /// Print statistics derived from the series file.
    Stats {
        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print the document count of every collection.
    Contents,

    /// Print the latest status updates, newest first.
    Status {
        /// How many updates to show (defaults to `[stats].status_limit`).
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Start the JSON API.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Store initialized at {}", cfg.store.db_path().display());
        }
        Commands::Sample => {
            let cancel = CancellationToken::new();
            let shutdown = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("interrupt received, stopping");
                    shutdown.cancel();
                }
            });
            sampler::run_sampler(&cfg, cancel).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Contents => {
            inspect::run_contents(&cfg).await?;
        }
        Commands::Status { limit } => {
            inspect::run_status(&cfg, limit).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
