//! facecheck API server binary.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use facecheck_api::{create_router, spawn_engine, ApiConfig, AppState};
use facecheck_core::FacePipeline;
use facecheck_store::RecordStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = ApiConfig::from_env();
    tracing::info!(host = %config.host, port = config.port, "facecheck-api starting");

    // Fail fast: models and store directories must be usable before the
    // listener binds.
    let pipeline = FacePipeline::load(
        &config.detector_model_path(),
        &config.recognizer_model_path(),
    )
    .context("failed to load face models")?;
    let engine = spawn_engine(pipeline);

    let store = RecordStore::open(&config.data_dir)
        .with_context(|| format!("failed to open record store at {}", config.data_dir.display()))?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid bind address")?;

    let state = AppState::new(config, store, engine);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("facecheck-api shut down");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("received shutdown signal");
    }
}
