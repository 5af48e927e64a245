//! Message types for actor communication
//!
//! 1. **Commands**: request/response messages sent to the monitor via mpsc
//! 2. **Events**: broadcast notifications, one per completed cycle

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::RelayState;
use crate::snapshot::Snapshot;

/// Event published after every monitor cycle
///
/// Subscribers that lag may miss events; the snapshot store always holds the
/// latest state.
#[derive(Debug, Clone)]
pub struct CycleEvent {
    pub cycle: u64,
    pub relay_state: RelayState,
    pub miss_count: u64,

    /// Whether a watchlist device was seen this cycle
    pub watchlist_hit: bool,
    pub device_count: usize,

    /// The sweep failed as a whole
    pub scan_failed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Commands that can be sent to the MonitorActor
#[derive(Debug)]
pub enum MonitorCommand {
    /// Run a cycle immediately (bypassing the interval timer)
    ///
    /// Responds with the snapshot published by that cycle.
    ScanNow {
        respond_to: oneshot::Sender<Arc<Snapshot>>,
    },

    /// Stop after the in-flight cycle and switch the relay off
    Shutdown,
}
