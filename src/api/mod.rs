//! REST API and WebSocket server for the dashboard
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Pipeline health
//! - `GET /api/metrics/latest` - Latest snapshot
//! - `GET /api/metrics/history` - Recent snapshots
//! - `GET /api/alerts` - Recent alerts
//! - `WS /api/stream` - Live snapshots, alerts and status events
//!
//! Static dashboard assets are served from the configured directory when it
//! exists.

pub mod error;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;
pub use types::HealthResponse;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::{Router, routing::get};
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,

    /// Allow any origin, needed when the dashboard is served elsewhere
    pub enable_cors: bool,

    /// Directory with the dashboard assets
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(
                crate::util::get_default_addr(),
                crate::util::get_default_port(),
            ),
            enable_cors: true,
            static_dir: Some(PathBuf::from("static")),
        }
    }
}

/// Build the router with every endpoint
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::services::ServeDir;
    use tower_http::trace::TraceLayer;

    let mut app = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/metrics/latest", get(routes::metrics::get_latest_metrics))
        .route("/api/metrics/history", get(routes::metrics::get_metrics_history))
        .route("/api/alerts", get(routes::alerts::get_alerts))
        .route("/api/stream", get(websocket::websocket_handler))
        .with_state(state);

    if let Some(dir) = config.static_dir.as_ref().filter(|dir| dir.exists()) {
        info!("serving dashboard from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }

    app = app.layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Bind and serve in a background task, returns the bound address
///
/// Binding to port 0 picks a free port.
pub async fn spawn_api_server(config: ApiConfig, state: ApiState) -> anyhow::Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;
    let app = router(&config, state);

    info!("dashboard API listening on http://{addr}");

    tokio::spawn(async move {
        // peer addresses name websocket connections in the gateway
        let service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, service).await {
            error!("API server stopped: {e}");
        }
    });

    Ok(addr)
}
