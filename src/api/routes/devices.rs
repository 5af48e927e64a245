//! Single device lookup

use std::net::Ipv4Addr;

use axum::{
    Json,
    extract::{Path, State},
};

use crate::DiscoveredDevice;
use crate::api::{
    error::{ApiError, ApiResult},
    state::ApiState,
};

/// GET /api/v1/devices/{address}
///
/// Returns the device if it was reachable in the latest cycle
pub async fn get_device(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> ApiResult<Json<DiscoveredDevice>> {
    let address: Ipv4Addr = address
        .parse()
        .map_err(|_| ApiError::InvalidRequest(format!("invalid IPv4 address: {address}")))?;

    let snapshot = state.snapshots.load().await;
    snapshot
        .all_devices
        .iter()
        .find(|device| device.address == address)
        .cloned()
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{address} not seen in the latest cycle")))
}
