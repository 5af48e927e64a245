//! Snapshot consistency under concurrent readers
//!
//! Cycles alternate between "watched device present" and "nothing present"
//! with a zero debounce threshold, so every complete snapshot satisfies
//! `relay On <=> watchlist_devices non-empty`. A torn read would break that.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use pressure_server::{RelayState, actors::monitor::MonitorHandle};
use tokio::sync::broadcast;

use crate::helpers::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_readers_never_see_torn_snapshot() {
    let a = ip(225);
    let cycles: Vec<_> = (0..60)
        .map(|i| if i % 2 == 0 { vec![a, ip(3)] } else { vec![ip(3)] })
        .collect();

    let (context, _) = context(0).await;
    let (event_tx, _) = broadcast::channel(256);
    let handle = MonitorHandle::spawn(
        Arc::new(ScriptedSweep::new(cycles)),
        settings(&[a]),
        context,
        event_tx,
    );

    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));
    let mut readers = vec![];

    for _ in 0..4 {
        let snapshots = handle.context().snapshots.clone();
        let done = done.clone();
        let reads = reads.clone();

        readers.push(tokio::spawn(async move {
            while !done.load(Ordering::SeqCst) {
                let snapshot = snapshots.load().await;
                if snapshot.cycle > 0 {
                    assert_eq!(
                        snapshot.relay_state == RelayState::On,
                        !snapshot.watchlist_devices.is_empty(),
                        "torn snapshot at cycle {}",
                        snapshot.cycle
                    );
                    assert!(
                        snapshot
                            .watchlist_devices
                            .iter()
                            .all(|d| d.in_watchlist && snapshot.all_devices.contains(d))
                    );
                }
                reads.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        }));
    }

    for _ in 0..59 {
        handle.scan_now().await.unwrap();
    }

    done.store(true, Ordering::SeqCst);
    for reader in readers {
        reader.await.unwrap();
    }

    assert!(reads.load(Ordering::SeqCst) > 0);
    handle.shutdown(Duration::from_secs(1)).await;
}

#[tokio::test]
async fn test_concurrent_scan_now_requests_are_serialized() {
    let (context, _) = context(2).await;
    let (event_tx, _) = broadcast::channel(64);
    let handle = Arc::new(MonitorHandle::spawn(
        Arc::new(ScriptedSweep::default()),
        settings(&[]),
        context,
        event_tx,
    ));

    let mut tasks = vec![];
    for _ in 0..10 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move { handle.scan_now().await }));
    }

    let mut cycles = vec![];
    for task in tasks {
        cycles.push(task.await.unwrap().unwrap().cycle);
    }
    cycles.sort_unstable();
    cycles.dedup();

    // every request got its own cycle
    assert_eq!(cycles.len(), 10);

    let handle = Arc::try_unwrap(handle).ok().expect("handle still shared");
    handle.shutdown(Duration::from_secs(1)).await;
}
