//! stashsort - capture daemon
//!
//! Watches the game client's lobby traffic and keeps per-character inventory
//! snapshots on disk for the sort tooling.

use clap::Parser;
use stashsort_service::{Config, StashService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stashsort")]
#[command(about = "Capture daemon for stashsort")]
#[command(version)]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "STASHSORT_CONFIG")]
    config: Option<PathBuf>,

    /// Start capturing even if the previous session was stopped
    #[arg(long)]
    capture: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if given, then env overrides)
    let config = match Config::load_from(args.config.clone()) {
        Ok(c) => {
            if let Some(path) = &args.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    tracing::info!("Starting stashsort");
    tracing::info!("  Interface: {}", config.capture.interface);
    tracing::info!(
        "  Server ports: {}-{}",
        config.capture.port_low,
        config.capture.port_high
    );
    tracing::info!("  Data directory: {}", config.storage.data_dir.display());
    tracing::info!("  Reassembly: {}", config.protocol.reassembly);

    let service = Arc::new(StashService::open(config)?);

    // The cache is loaded; only now may capture start.
    let start = if service.should_auto_start() {
        tracing::info!("Previous session was capturing; resuming");
        true
    } else {
        args.capture
    };
    if start {
        let svc = service.clone();
        match tokio::task::spawn_blocking(move || svc.start_capture()).await? {
            Ok(()) => tracing::info!("Capture started"),
            Err(e) => {
                tracing::error!("Failed to start capture: {}", e);
                return Err(e.into());
            }
        }
    } else {
        tracing::info!("Capture not started (pass --capture to start it)");
    }

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal, stopping capture...");

    service.cancel_sort();
    let svc = service.clone();
    match tokio::task::spawn_blocking(move || svc.stop_capture()).await? {
        Ok(outcome) => tracing::info!("Capture stopped ({:?})", outcome),
        Err(e) => tracing::error!("Failed to stop capture: {}", e),
    }

    let status = service.capture_state();
    tracing::info!(
        "Decoded {} frame(s), discarded {}",
        status.frames_decoded,
        status.frames_discarded
    );
    Ok(())
}
