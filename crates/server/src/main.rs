use std::sync::Arc;

use pong_server::app::App;
use pong_server::config::ServerConfig;
use pong_server::store::MemoryStore;
use pong_server::{dashboard, persistence, sweeper};

#[tokio::main]
async fn main() {
    let config = ServerConfig::from_args(std::env::args().skip(1));

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Pong match server");

    // ── Load durable records ─────────────────────────────────────────────
    let store = Arc::new(MemoryStore::new());
    match persistence::load_into(&store, &config.data_dir) {
        Ok(0) => tracing::info!("No saved records found"),
        Ok(n) => tracing::info!("Loaded {} records from {}", n, config.data_dir.display()),
        Err(e) => tracing::error!("Failed to load saved records: {:#}", e),
    }

    let app = Arc::new(App::new(config.clone(), store.clone()));
    app.recover();

    // Start the operator dashboard (non-blocking, runs on its own tasks).
    let dash = app.dashboard();
    let dashboard_port = config.dashboard_port;
    tokio::spawn(async move {
        dashboard::server::start(dash, dashboard_port).await;
    });

    sweeper::spawn(Arc::clone(&app.games), config.sweep_interval, config.stale_after);

    // ── Periodic autosave ────────────────────────────────────────────────
    let save_store = Arc::clone(&store);
    let save_dir = config.data_dir.clone();
    let autosave_every = config.autosave_interval;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(autosave_every);
        interval.tick().await; // first tick is immediate, skip it
        loop {
            interval.tick().await;
            tracing::info!("Autosaving...");
            match persistence::save_store(&save_store, &save_dir) {
                Ok(n) => tracing::info!("Autosave complete: {} records", n),
                Err(e) => tracing::error!("Autosave failed: {:#}", e),
            }
        }
    });

    // ── Start listener with graceful shutdown ────────────────────────────
    tokio::select! {
        result = pong_server::net::listener::run(Arc::clone(&app), &config.bind_addr) => {
            if let Err(e) = result {
                tracing::error!("Server error: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Ctrl+C received, shutting down...");
        }
    }

    // ── Save on shutdown ─────────────────────────────────────────────────
    tracing::info!("Saving records before exit...");
    match persistence::save_store(&store, &config.data_dir) {
        Ok(n) => tracing::info!("Shutdown save complete: {} records written", n),
        Err(e) => tracing::error!("Shutdown save failed: {:#}", e),
    }
}
