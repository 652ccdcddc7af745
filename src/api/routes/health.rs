//! Health check endpoint

use axum::{Json, extract::State};

use crate::actors::messages::PublisherState;
use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/health
///
/// Reports "healthy" unless the metrics source is degraded or the publisher
/// has stopped.
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let health = state.pipeline.health().await;

    let status = match health.publisher_state {
        PublisherState::Degraded => "degraded",
        PublisherState::Stopped => "stopped",
        _ => "healthy",
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        publisher_state: health.publisher_state,
        consecutive_failures: health.consecutive_failures,
        connected_clients: health.connected_clients,
    })
}
