//! API response types

use serde::{Deserialize, Serialize};

use crate::snapshot::Snapshot;

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,

    /// RFC 3339 timestamp
    pub timestamp: String,

    /// Number of completed monitor cycles
    pub last_cycle: u64,
}

/// Returned by GET /api/v1/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub host_name: String,

    /// Whether at least one cycle has completed since startup
    pub ready: bool,

    #[serde(flatten)]
    pub snapshot: Snapshot,
}
