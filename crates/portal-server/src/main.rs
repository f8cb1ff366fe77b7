//! Portal Server
//!
//! Account registration, password login and bearer-token sessions over a
//! JSON HTTP API. Records are kept by `portal-storage` (redb by default).

mod config;
mod extractors;
mod handlers;
mod routes;
mod services;

use anyhow::{Context, Result};
use portal_storage::{open_storage, StorageManager};
use services::{AuthService, UserDirectory};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageManager>,
    pub auth: Arc<AuthService>,
    pub users: Arc<UserDirectory>,
}

impl AppState {
    pub fn new(storage: Arc<StorageManager>, session_ttl: chrono::Duration) -> Self {
        Self {
            auth: Arc::new(AuthService::new(storage.clone(), session_ttl)),
            users: Arc::new(UserDirectory::new(storage.clone())),
            storage,
        }
    }
}

#[tokio::main]
async fn main() {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("[FATAL] Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!("Starting Portal Server v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run_server().await {
        error!("Server failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server() -> Result<()> {
    let config = ServerConfig::load().context("Failed to load configuration")?;
    let addr = config.socket_addr()?;
    info!(
        "Config loaded: bind={}, storage={}, session_ttl={}s",
        config.bind_address, config.storage.backend, config.session_ttl_secs
    );

    let storage = Arc::new(open_storage(&config.storage).context("Failed to open storage")?);
    let state = AppState::new(storage.clone(), config.session_ttl());
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down");
    storage.close().context("Failed to close storage")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
