//! HTML status page

use axum::{extract::State, response::Html};

use crate::api::{render, state::ApiState};

/// GET /
pub async fn status_page(State(state): State<ApiState>) -> Html<String> {
    let snapshot = state.snapshots.load().await;
    Html(render::status_page(&snapshot, &state.host_name))
}
