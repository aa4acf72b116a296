//! # Huddle Server
//!
//! Realtime messaging server with rooms and presence.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! huddle
//!
//! # Run with custom config
//! huddle --config /path/to/huddle.toml
//!
//! # Run with environment variables
//! HUDDLE__PORT=8080 HUDDLE__HOST=0.0.0.0 huddle
//! ```

use anyhow::Result;
use clap::Parser;
use huddle_server::{config::Config, handlers, metrics};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Realtime messaging server with rooms and presence.
#[derive(Parser, Debug)]
#[command(name = "huddle", version, about)]
struct Args {
    /// Path to a TOML config file; the default search path is used otherwise
    #[arg(long, env = "HUDDLE_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huddle=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    tracing::info!("Starting Huddle server on {}:{}", config.host, config.port);

    // Initialize metrics
    metrics::init_metrics();

    // Start the server
    handlers::run_server(config).await?;

    Ok(())
}
