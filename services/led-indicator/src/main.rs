//! LED indicator entry point

use actor_config::{load_node_config, NodeConfig};
use anyhow::{Context, Result};
use clap::Parser;
use led_indicator::{indicator, Led, DEFAULT_THING_ID};
use network::WebSocketConnection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Actor identity, overrides the configuration
    #[arg(long)]
    thing_id: Option<String>,

    /// Bus URL, overrides the configuration
    #[arg(long)]
    url: Option<String>,

    /// Log level, overrides the configuration (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(args: &Args) -> Result<NodeConfig> {
    let mut config = load_node_config(args.config.as_deref()).context("Failed to load node configuration")?;
    if let Some(thing_id) = &args.thing_id {
        config.thing_id = thing_id.clone();
    }
    if config.thing_id.is_empty() {
        config.thing_id = DEFAULT_THING_ID.to_string();
    }
    if let Some(url) = &args.url {
        config.url = url.clone();
    }
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    config.resolve()
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    if args.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    init_tracing(&config.log_level, args.json_logs);
    info!(thing_id = %config.thing_id, version = env!("CARGO_PKG_VERSION"), "Starting LED indicator");

    let connection = WebSocketConnection::new(&config.url)?
        .with_timeout(config.connect_timeout())
        .with_handshake_frames(config.handshake_frames.clone());
    let led = Arc::new(Led::new("air-quality"));

    let handle = indicator(config.thing_id.clone(), Arc::new(connection), led)
        .start()
        .await
        .context("Failed to start indicator actor")?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutdown signal received");
    handle.stop().await?;
    Ok(())
}
