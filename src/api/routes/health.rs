//! Health check endpoint

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::HealthResponse};

/// GET /api/v1/health
///
/// Always "ok" while the server runs; `last_cycle` shows whether the monitor
/// has published anything yet
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let snapshot = state.snapshots.load().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        last_cycle: snapshot.cycle,
    })
}
