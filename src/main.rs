//! promcount - named monotonic counters over HTTP
//!
//! Usage:
//!     promcount [--config <path>] [--host <addr>] [--port <port>]
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{error, info};

use promcount::config::{Config, load_config, validate_config};
use promcount::server::HttpServer;
use promcount::state::AppState;
use promcount::util::{ShutdownSignal, init_logging, wait_for_signal};

/// Serve named monotonic counters in Prometheus text format.
#[derive(Parser, Debug)]
#[command(name = "promcount")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override bind address
    #[arg(long, value_name = "ADDR")]
    host: Option<IpAddr>,

    /// Override bind port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| {
            format!("failed to load configuration from '{}'", path.display())
        })?,
        None => Config::default(),
    };

    apply_overrides(&mut config, &cli);
    validate_config(&config)
        .map_err(anyhow::Error::msg)
        .context("invalid configuration")?;

    init_logging(&config.global.log_level, &config.global.log_format)
        .context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.server.bind_address());
        println!(
            "  Self metrics: {}",
            if config.exposition.include_self_metrics { "on" } else { "off" }
        );
        return Ok(());
    }

    info!(
        listen = %config.server.bind_address(),
        include_self_metrics = config.exposition.include_self_metrics,
        "promcount starting"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(run(config))
}

/// Apply command line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, cli: &Cli) {
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(level) = &cli.log_level {
        config.global.log_level = level.clone();
    }
}

/// Serve until a shutdown signal arrives.
async fn run(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    let state = AppState::new(&config);
    let address = config.server.bind_address();

    let server = HttpServer::bind(address, state)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    let handle = tokio::spawn(server.run(shutdown.subscribe()));

    info!("press Ctrl+C to stop");
    wait_for_signal().await;

    shutdown.shutdown();
    if let Err(e) = handle.await {
        error!(error = %e, "http server task failed");
    }

    info!("promcount shut down complete");
    Ok(())
}
