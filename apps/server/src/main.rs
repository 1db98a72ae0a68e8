//! Pitwall - live telemetry hub
//!
//! Reads battery monitors and a GPS receiver over serial links, keeps one
//! merged snapshot of vehicle state (plus GPS speed and lap count) and pushes
//! it to every connected websocket viewer once per broadcast period.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pitwall_ingest_core::{spawn_source, stop_channel};
use pitwall_ingest_serial::{SerialConfig, SerialSource};
use pitwall_server::config::ServerConfig;
use pitwall_server::hub::ConnectionHub;
use pitwall_server::routes::{self, AppState};
use pitwall_server::store::StateStore;

const DEFAULT_LOG_FILTER: &str = "pitwall_server=info,pitwall_ingest_core=info,pitwall_ingest_serial=info";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML). Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listen address from the configuration
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let args = Args::parse();
    let mut cfg = match &args.config {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            ServerConfig::load(path)?
        }
        None => {
            info!("Using default configuration");
            ServerConfig::default()
        }
    };
    if let Some(bind) = args.bind {
        cfg.bind_addr = bind;
    }

    let store = Arc::new(StateStore::new(&cfg.links, cfg.geofence));
    let hub = Arc::new(ConnectionHub::new());

    // one ingestor per link; each owns its port and stops when stop_tx is dropped
    let (stop_tx, stop_rx) = stop_channel();
    let ingestors: Vec<_> = cfg
        .links
        .iter()
        .map(|link| {
            let src = SerialSource::new(SerialConfig::new(link.clone()));
            spawn_source(src, store.clone(), stop_rx.clone())
        })
        .collect();
    drop(stop_rx);

    let app = routes::router(AppState {
        store: store.clone(),
        hub: hub.clone(),
        period: cfg.broadcast_interval(),
    });
    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr))?;
    info!("Server running on {}", cfg.bind_addr);

    let shutdown_hub = hub.clone();
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
            shutdown_hub.shutdown();
        })
        .await
        .context("http server")?;

    drop(stop_tx);
    for handle in ingestors {
        let _ = handle.await;
    }

    if let Some(path) = &cfg.lap_log_path {
        let laps = store.laps();
        match iox::export_laps(&laps, path) {
            Ok(()) => info!(laps = laps.len(), "lap log written to {}", path.display()),
            Err(e) => warn!(error = %e, "lap log not written"),
        }
    }
    Ok(())
}
