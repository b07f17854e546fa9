//! keyscoped: background daemon for system-wide keyboard analytics
//!
//! The daemon:
//! - Supervises the capture helper process and parses its stdout protocol
//! - Aggregates keystroke analytics and persists counts to disk
//! - Serves status, analytics, and live key events over a Unix socket

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use keyscope::analytics::{AnalyticsStore, KeyStats};
use keyscope::config::Config;
use keyscope::ipc::Server;
use keyscope::lifecycle::ShutdownSignal;
use keyscope::supervisor::{DaemonState, Supervisor};

#[derive(Parser, Debug)]
#[command(name = "keyscoped")]
#[command(about = "Keyboard activity daemon", version)]
struct Args {
    /// Directory for the socket and persisted analytics
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path to the capture helper binary
    #[arg(long)]
    helper: Option<PathBuf>,

    /// Start capturing immediately
    #[arg(long)]
    track: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info"))
        )
        .init();

    let args = Args::parse();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "keyscoped starting"
    );

    // Load configuration, flags over environment
    let config = Config::load_with(args.data_dir, args.helper)?;
    config.ensure_dirs()?;
    info!(?config.socket_path, ?config.helper_path, "configuration loaded");

    // Restore persisted keystroke counts
    let store = AnalyticsStore::new(config.analytics_path.clone());
    let saved = store.load();
    if !saved.is_empty() {
        info!(keys = saved.len(), "restoring saved analytics");
    }
    let mut initial = KeyStats::new();
    initial.hydrate(saved);

    let state = Arc::new(RwLock::new(DaemonState::new()));
    let stats = Arc::new(RwLock::new(initial));

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Create channels for inter-component communication
    // IPC clients -> supervisor
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    // Supervisor -> subscribed IPC clients
    let (feed_tx, _feed_rx) = broadcast::channel(256);

    // Create IPC server
    let server = Server::new(
        &config.socket_path,
        Arc::clone(&state),
        Arc::clone(&stats),
        cmd_tx,
        feed_tx.clone(),
    )?;

    // Create the supervisor that owns the capture helper
    let mut supervisor =
        Supervisor::new(&config, Arc::clone(&state), Arc::clone(&stats), feed_tx);

    if args.track {
        match supervisor.set_tracking(true).await {
            Ok(()) => {
                info!("tracking enabled at startup");
            }
            Err(e) => {
                error!(?e, "failed to start capture helper");
                warn!("continuing without capture - enable tracking over IPC to retry");
            }
        }
    }

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the supervisor (processes helper lines and commands)
        _ = supervisor.run(cmd_rx) => {
            info!("supervisor exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Wait for shutdown signal
        signal = shutdown.wait() => {
            info!(signal, "shutdown signal received");
        }
    }

    // Cleanup
    info!("shutting down...");

    supervisor.shutdown().await;
    server.shutdown().await;

    info!("keyscoped stopped");

    Ok(())
}
