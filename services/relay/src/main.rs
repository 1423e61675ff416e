//! Relay service entry point

use actor_config::load_relay_config;
use anyhow::{Context, Result};
use clap::Parser;
use relay::RelayServer;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address, overrides the configuration
    #[arg(long)]
    bind: Option<String>,

    /// Log level, overrides the configuration (RUST_LOG still wins)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long)]
    json_logs: bool,
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

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_relay_config(args.config.as_deref()).context("Failed to load relay configuration")?;
    if let Some(bind) = args.bind {
        config.bind_address = bind;
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }
    config.validate()?;

    init_tracing(&config.log_level, args.json_logs);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting relay");

    let server = RelayServer::new(config);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = &result {
                error!(error = %e, "Relay stopped");
            }
            result
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
            Ok(())
        }
    }
}
