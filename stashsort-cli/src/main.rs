//! stashsort-cli - Offline operator tool for stashsort
//!
//! Reads the snapshots the capture daemon persisted; never captures or moves
//! the pointer itself.

mod commands;
mod render;

use clap::{Parser, Subcommand};
use colored::Colorize;
use stashsort_capture::UnavailableBackend;
use stashsort_core::DryRunActuator;
use stashsort_service::{Config, StashService};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stashsort-cli")]
#[command(about = "Inspect captured inventories and plan stash sorts")]
#[command(version)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, env = "STASHSORT_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory (overrides the configuration)
    #[arg(short, long, env = "STASHSORT_DATA")]
    data: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List captured characters
    Characters,

    /// Render a container of a character
    Show {
        /// Character ID
        character: u64,

        /// Container name or inventory id (storage, bag, shared_stash, 5, ...)
        container: String,
    },

    /// Compute the moves a sort would make, without moving anything
    Plan {
        /// Character ID
        character: u64,

        /// Container name or inventory id
        container: String,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode a raw server-to-client payload dump and store its messages
    Decode {
        /// File holding captured TCP payload bytes of one stream
        file: PathBuf,

        /// Decode only; do not write snapshots
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load_from(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    };
    if let Some(data) = cli.data {
        config.storage.data_dir = data;
    }
    tracing::debug!("Using data directory {}", config.storage.data_dir.display());

    if let Commands::Config = cli.command {
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    let actuator = Box::new(DryRunActuator::new(config.screen.clone()));
    let service = StashService::new(config, Arc::new(UnavailableBackend), actuator)?;

    match commands::execute(&service, cli.command) {
        Ok(output) => {
            println!("{}", output);
        }
        Err(e) => {
            eprintln!("{}: {}", "Error".red(), e);
            std::process::exit(1);
        }
    }

    Ok(())
}
