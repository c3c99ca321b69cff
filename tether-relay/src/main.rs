//! tether-relay binary entry point.
//!
//! Usage:
//! ```bash
//! tether-relay --config relay.toml
//! tether-relay --help
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tether_relay::auth::StaticTokens;
use tether_relay::cleanup::spawn_cleanup_task;
use tether_relay::config::Config;
use tether_relay::http::{build_router, health};
use tether_relay::server::TetherRelay;
use tether_relay::storage::SqliteStore;
use tracing_subscriber::EnvFilter;

/// WebSocket relay for Tether terminal sessions.
#[derive(Parser, Debug)]
#[command(name = "tether-relay", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Override `server.bind_address`.
    #[arg(long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        tracing::warn!(
            "Config file {} not found, using defaults",
            cli.config.display()
        );
        Config::default()
    };
    if let Some(bind) = cli.bind {
        config.server.bind_address = bind;
    }
    if config.auth.tokens.is_empty() {
        tracing::warn!("No auth tokens configured; every connection will be rejected");
    }

    health::init_start_time();

    let store = SqliteStore::new(&config.storage.database)
        .await
        .with_context(|| format!("opening {}", config.storage.database.display()))?;
    let verifier = StaticTokens::from_config(&config.auth);
    let bind_address = config.server.bind_address.clone();

    let relay = Arc::new(TetherRelay::new(config, Arc::new(store), Arc::new(verifier)));
    let cleanup = spawn_cleanup_task(relay.clone());

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    tracing::info!(
        "tether-relay v{} listening on {}",
        env!("CARGO_PKG_VERSION"),
        listener.local_addr()?
    );

    let app = build_router(relay);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    cleanup.abort();
    tracing::info!("tether-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
