//! Pilot - task lifecycle service for browser agents

use clap::Parser;
use pilot_foundation::{JsonStore, PilotConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pilot - run, pause and steer browser agents over HTTP
#[derive(Parser, Debug)]
#[command(name = "pilot")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to bind (overrides config and PILOT_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides config and PILOT_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding config.json (defaults to global + project lookup)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let mut config = match &args.config {
        Some(dir) => PilotConfig::load_from(&JsonStore::new(dir))?,
        None => PilotConfig::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            let mut config = PilotConfig::default();
            config.apply_env_overrides();
            config
        }),
    };

    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    pilot_server::serve(config).await
}
