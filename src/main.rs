//! Community events board service
//!
//! Loads a published events spreadsheet, normalizes it, and serves filtered
//! lists, a month calendar and the category index as JSON.
//!
//! Module structure:
//! - `domain/` - Core types and pure algorithms (Event, dates, calendar)
//! - `io/` - External interfaces (feed, geocoder, cache store, HTTP API)
//! - `services/` - Pipeline (normalizer, geocode cache, filters, board)
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use events_board::infra::{Config, Metrics};
use events_board::io::start_http_server;
use events_board::services::EventBoard;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Community events board - feed normalization, filtering and calendar API
#[derive(Parser, Debug)]
#[command(name = "events-board", version, about)]
struct Args {
    /// Path to TOML or JSON configuration file (default: $CONFIG_FILE or config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG overrides; default INFO
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), git = env!("GIT_HASH"), "events_board_starting");

    let args = Args::parse();
    let config_path = args.config.unwrap_or_else(Config::resolve_config_path);
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        feed_configured = %config.feed_url().is_some(),
        geocode_endpoint = %config.geocode_endpoint(),
        geocode_concurrency = %config.geocode_concurrency(),
        cache_file = %config.cache_file(),
        http_port = %config.http_port(),
        "config_loaded"
    );
    if config.feed_url().is_none() {
        warn!("feed_not_configured");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let metrics = Arc::new(Metrics::new());
    let board = Arc::new(EventBoard::from_config(config.clone(), metrics.clone())?);

    // Periodic metrics log line
    let metrics_interval = config.metrics_interval_secs();
    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            metrics_clone.report().log();
        }
    });

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let port = config.http_port();
    if port > 0 {
        if let Err(e) = start_http_server(config.bind_address(), port, board, shutdown_rx).await {
            error!(error = %e, "http_server_error");
            let e: Box<dyn std::error::Error> = e;
            return Err(e);
        }
    } else {
        info!("http_server_disabled");
        let mut shutdown_rx = shutdown_rx;
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }
    }

    metrics.report().log();
    info!("events_board_shutdown_complete");
    Ok(())
}
