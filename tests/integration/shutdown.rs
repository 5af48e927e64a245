//! Shutdown always leaves the relay off

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use pressure_server::{
    RelayState,
    actors::monitor::{MonitorContext, MonitorHandle},
    controller::ActuatorController,
};
use tokio::sync::broadcast;

use crate::helpers::*;

#[tokio::test]
async fn test_shutdown_while_on() {
    let a = ip(226);
    let (context, relay) = context(10).await;
    let (event_tx, _) = broadcast::channel(16);
    let handle = MonitorHandle::spawn(
        Arc::new(ScriptedSweep::new(vec![vec![a], vec![a]])),
        settings(&[a]),
        context,
        event_tx,
    );

    let snapshot = handle.scan_now().await.unwrap();
    assert_eq!(snapshot.relay_state, RelayState::On);

    let context = handle.context().clone();
    let last = handle.shutdown(Duration::from_secs(1)).await;

    assert_eq!(last.relay_state, RelayState::Off);
    assert_eq!(relay.last(), Some(RelayState::Off));
    assert_eq!(context.snapshots.load().await.relay_state, RelayState::Off);
    assert_eq!(context.controller.lock().await.state(), RelayState::Off);
}

#[tokio::test]
async fn test_shutdown_while_off() {
    let (context, relay) = context(2).await;
    let (event_tx, _) = broadcast::channel(16);
    let handle = MonitorHandle::spawn(
        Arc::new(ScriptedSweep::default()),
        settings(&[ip(1)]),
        context,
        event_tx,
    );

    let last = handle.shutdown(Duration::from_secs(1)).await;

    assert_eq!(last.relay_state, RelayState::Off);
    assert_eq!(relay.last(), Some(RelayState::Off));
}

#[tokio::test]
async fn test_shutdown_mid_cycle_is_bounded() {
    let (context, relay) = context(2).await;
    context.controller.lock().await.apply(true).await;
    assert_eq!(relay.last(), Some(RelayState::On));

    let (event_tx, _) = broadcast::channel(16);
    let handle = MonitorHandle::spawn(Arc::new(StuckSweep), settings(&[ip(1)]), context, event_tx);

    // let the first tick start its never-ending sweep
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = tokio::time::Instant::now();
    let last = handle.shutdown(Duration::from_millis(200)).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(last.relay_state, RelayState::Off);
    assert_eq!(relay.last(), Some(RelayState::Off));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shutdown_stops_sweep_in_flight() {
    let sweep = Arc::new(BusySweep::default());
    let steps = Arc::clone(&sweep.steps);
    let (context, relay) = context(2).await;
    let (event_tx, _) = broadcast::channel(16);
    let handle = MonitorHandle::spawn(sweep, settings(&[ip(1)]), context, event_tx);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let last = handle.shutdown(Duration::from_millis(100)).await;

    let stopped_at = steps.load(Ordering::SeqCst);
    assert!(stopped_at > 0);
    assert_eq!(last.relay_state, RelayState::Off);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(
        steps.load(Ordering::SeqCst),
        stopped_at,
        "sweep kept running after shutdown returned"
    );
    assert_eq!(relay.last(), Some(RelayState::Off));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_relay_write_in_flight_finishes_before_power_down() {
    let a = ip(226);
    let relay = Arc::new(BlockingRelay::new(Duration::from_millis(150)));
    let controller = ActuatorController::new(relay.clone(), 2).await;
    let context = MonitorContext::new(controller);
    let (event_tx, _) = broadcast::channel(16);
    let handle = MonitorHandle::spawn(
        Arc::new(ScriptedSweep::new(vec![vec![a]])),
        settings(&[a]),
        context,
        event_tx,
    );

    // the first cycle is now inside its On write
    tokio::time::sleep(Duration::from_millis(50)).await;
    let last = handle.shutdown(Duration::from_millis(10)).await;
    assert_eq!(last.relay_state, RelayState::Off);

    let writes = relay.writes();
    let last_on = writes.iter().rposition(|s| *s == RelayState::On);
    let last_off = writes.iter().rposition(|s| *s == RelayState::Off);
    assert!(last_on.is_some());
    assert!(last_on < last_off, "writes out of order: {writes:?}");

    // no relay write is left running behind our back
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(relay.writes(), writes);
}
