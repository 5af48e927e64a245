//! End-to-end behaviour of the monitor cycle
//!
//! - Watchlist intersection drives the relay
//! - Debounce window holds the relay through short absences
//! - Sweep failures never stop the loop

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use pressure_server::{
    RelayState, Watchlist,
    actors::{messages::CycleEvent, monitor::MonitorHandle},
    config::{ScanConfig, ScanFailurePolicy},
    resolver::UNKNOWN_HOSTNAME,
    scanner::{Scanner, Sweep},
};
use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use crate::helpers::*;

async fn first_cycle(event_rx: &mut broadcast::Receiver<CycleEvent>) -> CycleEvent {
    tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
        .await
        .expect("first cycle did not run")
        .unwrap()
}

#[tokio::test]
async fn test_presence_scenario() {
    let a = ip(225);
    let b = ip(40);
    let sweep = ScriptedSweep::new(vec![vec![a, b], vec![b], vec![], vec![]]);
    let (context, relay) = context(2).await;
    let (event_tx, mut event_rx) = broadcast::channel(16);

    let handle = MonitorHandle::spawn(Arc::new(sweep), settings(&[a]), context, event_tx);

    // cycle 1 runs on the first tick
    let cycle1 = first_cycle(&mut event_rx).await;
    assert_eq!(cycle1.relay_state, RelayState::On);
    assert_eq!(cycle1.miss_count, 0);
    assert!(cycle1.watchlist_hit);

    let snapshot = handle.context().snapshots.load().await;
    assert_eq!(snapshot.all_devices.len(), 2);
    assert_eq!(snapshot.watchlist_devices.len(), 1);
    assert_eq!(snapshot.watchlist_devices[0].address, a);

    let cycle2 = handle.scan_now().await.unwrap();
    assert_eq!((cycle2.relay_state, cycle2.miss_count), (RelayState::On, 1));
    assert!(cycle2.watchlist_devices.is_empty());
    assert_eq!(cycle2.all_devices[0].address, b);

    let cycle3 = handle.scan_now().await.unwrap();
    assert_eq!((cycle3.relay_state, cycle3.miss_count), (RelayState::On, 2));
    assert!(cycle3.all_devices.is_empty());

    let cycle4 = handle.scan_now().await.unwrap();
    assert_eq!((cycle4.relay_state, cycle4.miss_count), (RelayState::Off, 3));
    assert_eq!(cycle4.cycle, 4);

    assert_eq!(
        relay.writes(),
        vec![RelayState::Off, RelayState::On, RelayState::Off]
    );

    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_stale_devices_do_not_survive() {
    let sweep = ScriptedSweep::new(vec![vec![ip(1), ip(2), ip(3)], vec![ip(2)]]);
    let (context, _) = context(2).await;
    let (event_tx, mut event_rx) = broadcast::channel(16);

    let handle = MonitorHandle::spawn(Arc::new(sweep), settings(&[]), context, event_tx);
    first_cycle(&mut event_rx).await;

    let snapshot = handle.scan_now().await.unwrap();
    let addresses: Vec<_> = snapshot.all_devices.iter().map(|d| d.address).collect();
    assert_eq!(addresses, vec![ip(2)]);

    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_sweep_failures_keep_loop_running() {
    let a = ip(181);
    let sweep = Arc::new(ScriptedSweep::new(vec![vec![a]]));
    sweep.push_failure("cannot determine own address");
    sweep.push_failure("cannot determine own address");

    let (context, _) = context(1).await;
    let (event_tx, mut event_rx) = broadcast::channel(16);
    let handle = MonitorHandle::spawn(sweep.clone(), settings(&[a]), context, event_tx);

    assert_eq!(first_cycle(&mut event_rx).await.relay_state, RelayState::On);

    // failed sweeps count as empty cycles
    let failed = handle.scan_now().await.unwrap();
    assert_eq!(failed.relay_state, RelayState::On);
    assert!(failed.scan_error.is_some());

    let failed = handle.scan_now().await.unwrap();
    assert_eq!(failed.relay_state, RelayState::Off);

    // and the loop keeps going
    let recovered = handle.scan_now().await.unwrap();
    assert!(recovered.scan_error.is_none());
    assert_eq!(recovered.cycle, 4);

    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_hold_policy_freezes_relay_during_failures() {
    let a = ip(181);
    let sweep = Arc::new(ScriptedSweep::new(vec![vec![a]]));
    for _ in 0..5 {
        sweep.push_failure("ping: permission denied");
    }

    let (context, _) = context(1).await;
    let (event_tx, mut event_rx) = broadcast::channel(16);
    let mut settings = settings(&[a]);
    settings.scan_failure_policy = ScanFailurePolicy::Hold;
    let handle = MonitorHandle::spawn(sweep.clone(), settings, context, event_tx);

    first_cycle(&mut event_rx).await;
    for _ in 0..5 {
        let snapshot = handle.scan_now().await.unwrap();
        assert_eq!(snapshot.relay_state, RelayState::On);
        assert_eq!(snapshot.miss_count, 0);
    }

    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_failed_reverse_lookup_still_listed() {
    let live: HashSet<_> = [ip(7), ip(120), ip(33)].into_iter().collect();
    let config = ScanConfig {
        pool_size: 32,
        resolve_pause: Duration::ZERO,
        subnet: Some(ip(0)),
        ..ScanConfig::default()
    };
    let scanner = Scanner::new(
        config,
        Watchlist::new([ip(33)]),
        Arc::new(StaticProbe(live)),
        Arc::new(FailingResolver),
    );

    let devices = scanner.sweep().await.unwrap();

    let addresses: Vec<_> = devices.iter().map(|d| d.address).collect();
    assert_eq!(addresses, vec![ip(7), ip(33), ip(120)]);
    assert!(devices.iter().all(|d| d.hostname == UNKNOWN_HOSTNAME));
    assert!(devices[1].in_watchlist);
}
