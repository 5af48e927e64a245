//! API shared state

use crate::snapshot::SnapshotStore;
use crate::util::local_host_name;

/// Shared state passed to all API handlers
#[derive(Debug, Clone)]
pub struct ApiState {
    /// Latest published monitor state (read only)
    pub snapshots: SnapshotStore,

    /// Name of the machine running the monitor
    pub host_name: String,
}

impl ApiState {
    pub fn new(snapshots: SnapshotStore) -> Self {
        Self {
            snapshots,
            host_name: local_host_name(),
        }
    }
}
