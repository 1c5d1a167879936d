//! Main entry point for the tombola lottery server.

use tombola::{cli, config, server, store};

use anyhow::Context;
use clap::Parser;
use config::Config;
use server::AppState;
use std::net::{SocketAddr, TcpListener};
use std::path::PathBuf;
use store::Store;

/// Minimal server entrypoint: parse CLI args and run the server.
///
/// Usage:
///   tombola [--config PATH] [--db URL]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::ServerCli::parse();

    // If debug is on: show everything at DEBUG level.
    // If debug is off: our crate at INFO, everything else quieter.
    let log_filter = if cli.debug {
        "debug".to_string()
    } else {
        "tombola=info,sqlx=warn,warn".to_string()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(cli.debug)
        .with_thread_ids(cli.debug)
        .with_file(cli.debug)
        .with_line_number(cli.debug)
        .init();

    let config_path: PathBuf = cli.config.clone();

    // Load or create config file (creates file if missing).
    let mut cfg = Config::load_or_create(&config_path)
        .with_context(|| format!("loading or creating config '{}'", config_path.display()))?;

    // Apply overrides in-memory: environment first, then CLI.
    if let Ok(db) = std::env::var("DATABASE_URL") {
        cfg.database_url = db;
    }
    if let Some(db) = cli.db {
        cfg.database_url = db;
    }

    // Persist overrides only if requested.
    if cli.persist {
        cfg.save(&config_path)
            .with_context(|| format!("saving updated config '{}'", config_path.display()))?;
    }

    tracing::info!(config = %config_path.display(), db = %cfg.database_url);

    let store = Store::connect(&cfg.database_url)
        .await
        .with_context(|| format!("opening store '{}'", cfg.database_url))?;

    let state = AppState::new(cfg, store);

    // Find first available port starting from 3000
    let port = find_available_port(3000)
        .map_err(|e| anyhow::anyhow!("Could not find an available port: {}", e))?;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    tracing::info!(port, "starting server");
    if port != 3000 {
        tracing::warn!(port, "port 3000 was not available, using alternative port");
    }

    server::run_server(addr, state).await?;
    Ok(())
}

/// Find the first available port starting from the given port number
fn find_available_port(start_port: u16) -> anyhow::Result<u16> {
    for port in start_port..start_port + 100 {
        match TcpListener::bind(("127.0.0.1", port)) {
            Ok(_) => return Ok(port),
            Err(_) => continue,
        }
    }
    Err(anyhow::anyhow!(
        "No available ports found in range {}..{}",
        start_port,
        start_port + 100
    ))
}
