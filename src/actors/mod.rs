//! Actor-based control loop
//!
//! The monitor runs as an independent async task and talks to the rest of the
//! process over Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!            ┌─────────────────┐
//!            │  server (main)  │
//!            └────────┬────────┘
//!                     │ spawns
//!            ┌────────▼────────┐   set_output   ┌─────────┐
//!            │  MonitorActor   │ ─────────────▶ │  Relay  │
//!            └───┬─────────┬───┘                └─────────┘
//!      publish   │         │ CycleEvent
//!   ┌────────────▼──┐   ┌──▼─────────────────┐
//!   │ SnapshotStore │   │ Broadcast Channel  │
//!   └───────┬───────┘   └────────────────────┘
//!           │ load
//!   ┌───────▼───────┐
//!   │  status API   │
//!   └───────────────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: an mpsc channel carries `ScanNow` and `Shutdown`
//! 2. **Events**: every finished cycle is broadcast as a `CycleEvent`
//! 3. **Request/Response**: `ScanNow` answers over a oneshot channel

pub mod messages;
pub mod monitor;
