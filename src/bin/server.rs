//! Trade Automator Web Server
//!
//! Serves the REST API and runs the trade monitor and account reconciliation
//! in the background.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use trade_automator::api::{create_app, AppState};
use trade_automator::Config;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Default to info for this crate, warn elsewhere. Override with RUST_LOG.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,trade_automator=info,tower_http=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    // Load configuration
    let config = Config::from_env()?;

    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║       XAU/USD TRADE AUTOMATOR - WEB SERVER                   ║");
    println!("╠══════════════════════════════════════════════════════════════╣");
    println!("║  Paper Trading: {:<44} ║", if config.paper_trading { "YES (safe mode)" } else { "NO - LIVE MODE" });
    println!("║  Broker:        {:<44} ║", if config.broker.is_configured() { "CONFIGURED" } else { "NOT CONFIGURED (simulated data)" });
    println!("║  Monitor:       {:<44} ║", format!("every {:?}", config.monitor.interval));
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    // Create application state
    info!("Initializing application state...");
    let state = AppState::new(config.clone()).await?;

    // Trade monitor
    state.monitor.start();

    // Account reconciliation
    let sync = state.account_sync.clone();
    let sync_interval = Duration::from_secs(config.account_sync_interval_seconds);
    tokio::spawn(async move {
        sync.run(sync_interval).await;
    });

    let app = create_app(state.clone());

    let addr: SocketAddr = config
        .server_addr
        .parse()
        .with_context(|| format!("Invalid SERVER_ADDR: {}", config.server_addr))?;
    let listener = TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.monitor.stop().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
