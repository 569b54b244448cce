//! Marginfi Exporter - publishes margin account risk figures for scraping
//!
//! Polls every marginfi account from a ledger RPC node and serves the
//! derived balances, margin requirements and venue positions on a
//! Prometheus endpoint.
//!
//! # Usage
//! ```sh
//! RPC_ENDPOINT=http://127.0.0.1:8899 METRICS_PORT=9003 cargo run
//! ```
//!
//! # Environment Variables
//! - `RPC_ENDPOINT` - Ledger node JSON-RPC URL (required)
//! - `ENV` - Deployment environment tag
//! - `MARGINFI_ACCOUNT` - Only poll this account
//! - `POLL_INTERVAL_SECS` - Base delay between cycles (default: 30)
//! - `METRICS_PORT` - Exposition port (default: 9003)

use anyhow::Result;
use marginfi_exporter::application::system::Exporter;
use marginfi_exporter::config::Config;
use tracing::{Level, error, info};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    info!("Marginfi Exporter {} starting...", env!("CARGO_PKG_VERSION"));

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            return Err(e.into());
        }
    };
    info!(
        "Configuration loaded: Env={}, Metrics={}, Interval={:?}, Concurrency={}",
        config.environment,
        config.observability.socket_addr(),
        config.poller.interval,
        config.poller.fetch_concurrency
    );

    let exporter = Exporter::build(config)?;
    info!("Exporter running. Press Ctrl+C to shutdown.");
    exporter.run().await
}
