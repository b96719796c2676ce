//! Agora Governance Node Entry Point
//!
//! Runs the proposal tracker with:
//! - HTTP API for proposals and votes
//! - Per-wallet rate limiting
//! - SQLite persistence (or in-memory with `--no-persistence`)
//! - Background sweep of expired proposals
//!
//! ## Usage
//!
//! ```bash
//! # Run with default configuration
//! agora-node
//!
//! # Run with a config file (TOML or YAML)
//! agora-node --config /etc/agora/node.toml
//!
//! # Throwaway instance for local testing
//! agora-node --no-persistence --no-rate-limit --port 9000 -v
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use agora_node::config::NodeConfig;
use agora_node::governance::{
    GovernanceApi, MemoryProposalStore, ProposalStore, ProposalSweeper, ProposalTracker,
    SqliteProposalStore, SystemClock,
};
use agora_node::rate_limiter::WalletRateLimiter;

/// Agora Governance Node
#[derive(Parser, Debug)]
#[command(name = "agora-node")]
#[command(author = "Agora Team")]
#[command(version = "0.1.0")]
#[command(about = "Agora proposal lifecycle tracker", long_about = None)]
struct Args {
    /// Path to configuration file (TOML or YAML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// API port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Data directory for persistence (overrides config)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Sweep interval in seconds (overrides config)
    #[arg(long)]
    sweep_interval: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Disable rate limiting (for testing)
    #[arg(long)]
    no_rate_limit: bool,

    /// Disable persistence (in-memory only)
    #[arg(long)]
    no_persistence: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Agora Governance Node v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };

    // Command line wins over the file
    if let Some(bind) = args.bind {
        config.server.host = bind;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(data_dir) = args.data_dir {
        config.storage.data_dir = data_dir;
    }
    if let Some(secs) = args.sweep_interval {
        config.governance.sweep_interval_secs = secs;
    }
    if args.no_persistence {
        config.storage.persistence = false;
    }
    if args.no_rate_limit {
        config.rate_limit.enabled = false;
        info!("Rate limiting disabled");
    }

    config.validate()?;

    let store = open_store(&config);

    let tracker = Arc::new(ProposalTracker::new(
        store,
        Arc::new(SystemClock),
        config.governance.clone(),
    ));
    let limiter = Arc::new(WalletRateLimiter::new(&config.rate_limit));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweeper = ProposalSweeper::from_config(tracker.clone()).spawn(shutdown_rx.clone());

    let api = Arc::new(GovernanceApi::new(tracker, limiter));
    let addr = config.bind_addr()?;
    let mut server = tokio::spawn(api.run(addr, shutdown_rx));

    // The API task only finishes early when it failed to bind or serve
    let early_exit = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Shutdown signal received"),
                Err(e) => error!("Failed to listen for shutdown signal: {}", e),
            }
            None
        }
        result = &mut server => Some(result),
    };

    let _ = shutdown_tx.send(true);

    let server_result = match early_exit {
        Some(result) => result,
        None => server.await,
    };

    if let Err(e) = sweeper.await {
        error!("Sweeper task failed: {}", e);
    }

    match server_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(e.context("Governance API failed")),
        Err(e) => return Err(anyhow::anyhow!("Governance API task failed: {}", e)),
    }

    info!("Agora Governance Node stopped");
    Ok(())
}

/// SQLite store when persistence is on and the database opens, memory otherwise
fn open_store(config: &NodeConfig) -> Arc<dyn ProposalStore> {
    if !config.storage.persistence {
        info!("Persistence disabled (in-memory only)");
        return Arc::new(MemoryProposalStore::new());
    }

    if let Err(e) = std::fs::create_dir_all(&config.storage.data_dir) {
        warn!(
            "Failed to create data directory {}: {}. Running in-memory only.",
            config.storage.data_dir.display(),
            e
        );
        return Arc::new(MemoryProposalStore::new());
    }

    match SqliteProposalStore::new(config.storage.db_path()) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Failed to initialize persistence: {}. Running in-memory only.", e);
            Arc::new(MemoryProposalStore::new())
        }
    }
}
