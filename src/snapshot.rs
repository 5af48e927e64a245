//! Latest published monitor state
//!
//! The store holds an `Arc<Snapshot>` behind a lock that is only taken to clone
//! or swap the pointer, so readers see either the old or the new snapshot as a
//! whole.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{DiscoveredDevice, RelayState};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub relay_state: RelayState,
    pub miss_count: u64,

    /// Every reachable device, sorted by numeric address
    pub all_devices: Vec<DiscoveredDevice>,

    /// The watchlist members among `all_devices`, same order
    pub watchlist_devices: Vec<DiscoveredDevice>,

    /// Completed cycles; 0 until the first cycle has been published
    pub cycle: u64,
    pub published_at: Option<DateTime<Utc>>,

    /// Set when the sweep of this cycle failed as a whole
    pub scan_error: Option<String>,
}

impl Snapshot {
    pub fn new(
        cycle: u64,
        relay_state: RelayState,
        miss_count: u64,
        all_devices: Vec<DiscoveredDevice>,
        scan_error: Option<String>,
    ) -> Self {
        let watchlist_devices = all_devices
            .iter()
            .filter(|device| device.in_watchlist)
            .cloned()
            .collect();

        Self {
            relay_state,
            miss_count,
            all_devices,
            watchlist_devices,
            cycle,
            published_at: Some(Utc::now()),
            scan_error,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotStore {
    current: Arc<RwLock<Arc<Snapshot>>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&*self.current.read().await)
    }

    /// Replaces the snapshot as a single unit
    pub async fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        *self.current.write().await = Arc::clone(&snapshot);
        snapshot
    }
}
