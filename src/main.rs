//! Replication monitor server
//!
//! Run with: cargo run -- --config config.yaml
//!
//! Environment variables:
//! - REPLMON_CONFIG: Path to the configuration file (default: config.yaml)
//! - SOURCE_DB_HOST / SOURCE_DB_USERNAME / SOURCE_DB_PASSWORD: Override the first pair's source
//! - TARGET_DB_HOST / TARGET_DB_USERNAME / TARGET_DB_PASSWORD: Override the first pair's target
//! - RUST_LOG: Log filter (default: replmon=<log_level>,tower_http=info)

use std::path::PathBuf;

use clap::Parser;
use replmon::api::run_server;
use replmon::config::load_config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "replmon", version, about = "Live divergence monitor for replication-based migrations")]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "REPLMON_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Configuration errors are fatal before anything starts
    let config = load_config(&args.config)?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("replmon={},tower_http=info", config.log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!(
        "Replication monitor {} using {}",
        env!("CARGO_PKG_VERSION"),
        args.config.display()
    );
    config.log_summary();

    run_server(config).await
}
