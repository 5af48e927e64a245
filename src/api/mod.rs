//! HTTP status responder
//!
//! Read-only view of the latest snapshot. Handlers never mutate monitor state.
//!
//! ## Endpoints
//!
//! - `GET /` - HTML status page
//! - `GET /api/v1/health` - Health check
//! - `GET /api/v1/status` - Current snapshot as JSON
//! - `GET /api/v1/devices/{address}` - A single discovered device

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod render;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{HealthResponse, StatusResponse};

#[cfg(feature = "api")]
use axum::{Router, routing::get};
use std::net::SocketAddr;
#[cfg(feature = "api")]
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:80")
    pub bind_addr: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: crate::util::get_bind_addr(),
        }
    }
}

/// All routes with their state attached
#[cfg(feature = "api")]
pub fn router(state: ApiState) -> Router {
    use tower_http::trace::TraceLayer;

    Router::new()
        .route("/", get(routes::page::status_page))
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/status", get(routes::status::get_status))
        .route("/api/v1/devices/:address", get(routes::devices::get_device))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    use anyhow::Context;

    info!("starting status server on {}", config.bind_addr);

    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("status server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("status server error: {}", e);
        }
    });

    Ok(addr)
}
