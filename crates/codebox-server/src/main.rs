//! HTTP server that runs submitted code in throwaway containers
//!
//! Loads configuration, connects to the container engine and serves `/run`
//! and `/health` until Ctrl+C or SIGTERM.

use anyhow::Result;
use clap::Parser;
use codebox_core::{CodeRunner, ConfigLoader};
use codebox_server::{shutdown_signal, CodeboxServer, ServerConfig};
use log::LevelFilter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Codebox Server - Run submitted code in disposable containers")]
struct Cli {
    #[clap(long, short, help = "Path to a YAML configuration file")]
    config: Option<PathBuf>,

    #[clap(long, help = "Bind address, overrides server.bind_addr")]
    bind_addr: Option<String>,

    #[clap(long, short, default_value = "info")]
    log_level: String,

    #[clap(long, help = "Disable CORS headers")]
    no_cors: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    let log_level_filter = cli.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(log_level_filter)
        .init();

    run_server(cli).await
}

async fn run_server(cli: Cli) -> Result<()> {
    match &cli.config {
        Some(path) => log::info!("Loading configuration from: {}", path.display()),
        None => log::info!("No configuration file given, using defaults and environment"),
    }
    let mut config = ConfigLoader::load(cli.config.as_deref()).await?;
    if let Some(bind_addr) = cli.bind_addr {
        config.server.bind_addr = bind_addr;
    }
    if cli.no_cors {
        config.server.enable_cors = false;
    }

    let runner = CodeRunner::with_docker(&config)?;
    match runner.sandbox().health_check().await {
        Ok(()) => log::info!("Container engine reachable"),
        Err(e) => log::warn!(
            "Container engine not reachable yet ({}); requests will fail until it is",
            e
        ),
    }
    log::info!(
        "Sandbox image {}, timeout {:?}, memory {} MB, cpus {}",
        config.sandbox.image,
        runner.limits().timeout,
        config.limits.memory_mb,
        config.limits.cpus
    );

    let server_config = ServerConfig::from_settings(&config.server)?;
    let server = CodeboxServer::with_config(runner, server_config);

    if let Err(e) = server.serve_with_shutdown(shutdown_signal()).await {
        log::error!("Server failed: {}", e);
        return Err(e.into());
    }

    Ok(())
}
