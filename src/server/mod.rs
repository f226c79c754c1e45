//! Prediction web server
//!
//! Serves the HTML form at `/` and a small JSON API under `/api`. The model
//! is resolved per request through the shared [`ModelCache`](crate::inference::ModelCache),
//! so a retrain that replaces the artifact is picked up without a restart.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use crate::inference::ServeConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub serve: ServeConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("API_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            serve: ServeConfig::default(),
        }
    }
}

/// Start the server with the given configuration
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let start_time = chrono::Utc::now();
    let state = Arc::new(AppState::new(config.clone()));

    // Warm the cache so a missing artifact shows up in the startup log
    match state.resolve_model().await {
        Ok(resolved) => info!(source = %resolved.source, "Model ready"),
        Err(e) => warn!(error = %e, "No model available yet, predictions will fail until one is trained"),
    }

    let app = create_router(state);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        address = %addr,
        model_path = %config.serve.model_path.display(),
        use_registry = config.serve.use_registry,
        started_at = %start_time.to_rfc3339(),
        "Diamond price server starting"
    );
    info!(url = %format!("http://{}", addr), "Prediction form available");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(address = %addr, pid = std::process::id(), "Server listening and ready to accept connections");

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(start_time);
        info!(uptime_secs = uptime.num_seconds(), "Shutdown signal received, stopping server gracefully");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    info!("Server shut down cleanly");
    Ok(())
}
