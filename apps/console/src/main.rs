mod backend_client;
mod config;
mod errors;
mod export;
mod jobs;
mod merge;
mod models;
mod ordering;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend_client::HttpBackend;
use crate::config::Config;
use crate::export::session::SessionStore;
use crate::jobs::JobStore;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Cobranza console v{}", env!("CARGO_PKG_VERSION"));

    let backend = HttpBackend::new(&config.backend_url, config.backend_timeout)?;
    info!(
        "Backend client initialized ({}, timeout {}s)",
        config.backend_url,
        config.backend_timeout.as_secs()
    );

    let state = AppState {
        backend: Arc::new(backend),
        sessions: SessionStore::default(),
        jobs: JobStore::default(),
        config: config.clone(),
    };
    state.spawn_retention_sweeper();

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
