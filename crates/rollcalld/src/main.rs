use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use rollcall_core::{Gallery, OnnxFaceExtractor};
use rollcall_store::AttendanceStore;

mod config;
mod engine;
mod events;
mod orchestrator;
mod registry;
mod routes;
mod state;
mod ws;

use config::Config;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    std::fs::create_dir_all(&config.photos_dir)
        .with_context(|| format!("creating photos directory {}", config.photos_dir.display()))?;

    let store = AttendanceStore::open(&config.db_path)
        .await
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    tracing::info!(db = %config.db_path.display(), "attendance store opened");

    // Fail fast if the models are missing; the engine owns them from here on.
    let extractor = OnnxFaceExtractor::load(
        &config.detector_model_path(),
        &config.embedder_model_path(),
    )
    .context("loading face models")?;
    let engine = engine::spawn_engine(Box::new(extractor));

    let state = AppState {
        registry: Arc::new(registry::SessionRegistry::new(store.clone())),
        gallery: Arc::new(Gallery::new()),
        engine,
        config: Arc::new(config),
        store,
    };

    let enrolled = state::refresh_gallery(&state).await?;
    tracing::info!(students = enrolled, "gallery loaded");

    let bind_addr = state.config.bind_addr;
    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "rollcalld listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("rollcalld shut down");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
