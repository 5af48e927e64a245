//! MonitorActor - runs the presence-detection control loop
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Sweep → watchlist hit? → ActuatorController → publish Snapshot → CycleEvent
//!     ↑
//!     └─── Commands (ScanNow, Shutdown) + stop signal
//! ```
//!
//! Cycles run one at a time inside the actor task, so they never overlap. The
//! wait between cycles is a biased `select!` on the command channel, the stop
//! signal and the timer, so `Shutdown` wins over a ready tick. A sweep in
//! flight is raced against the stop signal and cancelled together with all of
//! its probe workers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::{ResolvedConfig, ScanFailurePolicy};
use crate::controller::ActuatorController;
use crate::scanner::Sweep;
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::util::AbortOnDrop;
use crate::{DiscoveredDevice, Watchlist};

use super::messages::{CycleEvent, MonitorCommand};

/// State shared between the monitor and its readers
#[derive(Clone)]
pub struct MonitorContext {
    pub snapshots: SnapshotStore,
    pub controller: Arc<Mutex<ActuatorController>>,
}

impl MonitorContext {
    pub fn new(controller: ActuatorController) -> Self {
        Self {
            snapshots: SnapshotStore::new(),
            controller: Arc::new(Mutex::new(controller)),
        }
    }

    /// Forces the relay off and republishes the latest snapshot with that state
    pub async fn power_down(&self) -> Arc<Snapshot> {
        let mut controller = self.controller.lock().await;
        self.publish_off(&mut controller).await
    }

    async fn publish_off(&self, controller: &mut ActuatorController) -> Arc<Snapshot> {
        controller.shutdown().await;

        let mut snapshot = (*self.snapshots.load().await).clone();
        snapshot.relay_state = controller.state();
        snapshot.miss_count = controller.miss_count();
        snapshot.published_at = Some(Utc::now());
        self.snapshots.publish(snapshot).await
    }
}

/// Monitor loop settings
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub watchlist: Watchlist,
    pub scan_failure_policy: ScanFailurePolicy,
}

impl From<&ResolvedConfig> for MonitorSettings {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            interval: config.interval,
            watchlist: config.watchlist.clone(),
            scan_failure_policy: config.scan_failure_policy,
        }
    }
}

pub struct MonitorActor {
    sweeper: Arc<dyn Sweep>,
    settings: MonitorSettings,
    context: MonitorContext,

    /// Command receiver for control messages
    command_rx: mpsc::Receiver<MonitorCommand>,

    /// Becomes `true` once shutdown has been requested
    stop_rx: watch::Receiver<bool>,

    /// Broadcast sender for cycle notifications
    event_tx: broadcast::Sender<CycleEvent>,

    /// Completed cycles
    cycle: u64,
}

impl MonitorActor {
    pub fn new(
        sweeper: Arc<dyn Sweep>,
        settings: MonitorSettings,
        context: MonitorContext,
        command_rx: mpsc::Receiver<MonitorCommand>,
        stop_rx: watch::Receiver<bool>,
        event_tx: broadcast::Sender<CycleEvent>,
    ) -> Self {
        Self {
            sweeper,
            settings,
            context,
            command_rx,
            stop_rx,
            event_tx,
            cycle: 0,
        }
    }

    fn stopping(&self) -> bool {
        *self.stop_rx.borrow()
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command or the stop signal is received, or the
    /// command channel is closed. Either way the relay ends up off.
    #[instrument(skip(self), fields(interval = ?self.settings.interval))]
    pub async fn run(mut self) {
        info!(
            "starting monitor, watching {:?}",
            self.settings.watchlist.sorted()
        );

        let mut ticker = interval(self.settings.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stop_rx = self.stop_rx.clone();

        loop {
            tokio::select! {
                biased;

                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(MonitorCommand::ScanNow { respond_to }) => {
                            debug!("received ScanNow command");
                            if let Some(snapshot) = self.run_cycle().await {
                                let _ = respond_to.send(snapshot);
                            }
                        }

                        Some(MonitorCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        // the ticker never runs dry, so a closed channel has to be caught here
                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = stop_requested(&mut stop_rx) => {
                    debug!("stop requested");
                    break;
                }

                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }

        self.context.power_down().await;
        info!("monitor stopped");
    }

    /// One control cycle: sweep, decide, actuate, publish
    ///
    /// Returns `None` when the cycle was abandoned because of a shutdown.
    #[instrument(skip(self), fields(cycle = self.cycle + 1))]
    async fn run_cycle(&mut self) -> Option<Arc<Snapshot>> {
        let (devices, scan_error) = match self.sweep().await? {
            Ok(devices) => (devices, None),
            Err(e) => {
                error!("sweep failed: {e:#}");
                (vec![], Some(format!("{e:#}")))
            }
        };

        let watchlist_hit = self.settings.watchlist.is_hit(&devices);
        let device_count = devices.len();

        let mut controller = self.context.controller.lock().await;

        // checked under the lock: once shutdown holds it, no new relay write starts here
        if self.stopping() {
            debug!("shutdown requested, dropping cycle result");
            return None;
        }

        self.cycle += 1;

        let feeds_controller = scan_error.is_none()
            || self.settings.scan_failure_policy == ScanFailurePolicy::AssumeEmpty;
        if feeds_controller {
            controller.apply(watchlist_hit).await;
        } else {
            warn!("holding relay {} after failed sweep", controller.state());
        }

        let scan_failed = scan_error.is_some();
        let snapshot = Snapshot::new(
            self.cycle,
            controller.state(),
            controller.miss_count(),
            devices,
            scan_error,
        );
        let snapshot = self.context.snapshots.publish(snapshot).await;
        drop(controller);

        trace!(
            "{device_count} devices, watchlist hit: {watchlist_hit}, relay {}",
            snapshot.relay_state
        );

        let event = CycleEvent {
            cycle: self.cycle,
            relay_state: snapshot.relay_state,
            miss_count: snapshot.miss_count,
            watchlist_hit,
            device_count,
            scan_failed,
            timestamp: Utc::now(),
        };
        if self.event_tx.send(event).is_err() {
            trace!("no receivers for cycle event");
        }

        Some(snapshot)
    }

    /// Runs the sweep on its own task so a panic inside it only fails this cycle.
    ///
    /// Returns `None` if the stop signal arrived first; the sweep task has
    /// stopped by then.
    async fn sweep(&self) -> Option<Result<Vec<DiscoveredDevice>>> {
        let sweeper = Arc::clone(&self.sweeper);
        let mut task = AbortOnDrop::new(tokio::spawn(async move { sweeper.sweep().await }));
        let mut stop_rx = self.stop_rx.clone();

        let joined = tokio::select! {
            biased;

            _ = stop_requested(&mut stop_rx) => {
                debug!("cancelling sweep in flight");
                task.cancel().await;
                return None;
            }

            joined = &mut task => joined,
        };

        let result = joined
            .map_err(|e| anyhow!("sweep task failed: {e}"))
            .and_then(|swept| swept)
            .map(|mut devices| {
                // membership follows the configured watchlist, whatever the sweeper tagged
                for device in &mut devices {
                    device.in_watchlist = self.settings.watchlist.contains(&device.address);
                }
                devices
            });

        Some(result)
    }
}

/// Resolves once shutdown is requested or the handle is gone
async fn stop_requested(stop_rx: &mut watch::Receiver<bool>) {
    let _ = stop_rx.wait_for(|stop| *stop).await;
}

/// Handle for controlling a MonitorActor
pub struct MonitorHandle {
    sender: mpsc::Sender<MonitorCommand>,
    stop_tx: watch::Sender<bool>,
    context: MonitorContext,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Spawn a new monitor actor
    pub fn spawn(
        sweeper: Arc<dyn Sweep>,
        settings: MonitorSettings,
        context: MonitorContext,
        event_tx: broadcast::Sender<CycleEvent>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = watch::channel(false);

        let actor = MonitorActor::new(
            sweeper,
            settings,
            context.clone(),
            cmd_rx,
            stop_rx,
            event_tx,
        );
        let task = tokio::spawn(actor.run());

        Self {
            sender: cmd_tx,
            stop_tx,
            context,
            task,
        }
    }

    pub fn context(&self) -> &MonitorContext {
        &self.context
    }

    /// Run a cycle now and return the snapshot it published
    pub async fn scan_now(&self) -> Result<Arc<Snapshot>> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(MonitorCommand::ScanNow { respond_to: tx })
            .await
            .context("failed to send ScanNow command")?;

        rx.await.context("failed to receive response")
    }

    /// Stops the monitor and guarantees the relay is off afterwards.
    ///
    /// A sweep in flight is cancelled right away. If the actor still has not
    /// stopped after `grace`, it is aborted while this handle holds the
    /// controller lock, so no relay write of the actor can be in progress.
    pub async fn shutdown(mut self, grace: Duration) -> Arc<Snapshot> {
        let _ = self.stop_tx.send(true);
        if self.sender.try_send(MonitorCommand::Shutdown).is_err() {
            debug!("command queue unavailable, relying on stop signal");
        }

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => {
                debug!("monitor stopped within grace period");
                self.context.snapshots.load().await
            }
            Ok(Err(e)) => {
                error!("monitor task failed: {e}");
                self.context.power_down().await
            }
            Err(_) => {
                warn!("monitor did not stop within {grace:?}, aborting");
                let mut controller = self.context.controller.lock().await;
                self.task.abort();
                let _ = (&mut self.task).await;
                self.context.publish_off(&mut controller).await
            }
        }
    }
}
