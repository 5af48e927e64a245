//! Snapshot as JSON

use axum::{Json, extract::State};

use crate::api::{state::ApiState, types::StatusResponse};

/// GET /api/v1/status
///
/// Returns the latest published snapshot
pub async fn get_status(State(state): State<ApiState>) -> Json<StatusResponse> {
    let snapshot = state.snapshots.load().await;

    Json(StatusResponse {
        host_name: state.host_name.clone(),
        ready: snapshot.cycle > 0,
        snapshot: (*snapshot).clone(),
    })
}
