//! Debounced relay controller
//!
//! A watchlist hit switches the relay on at once. Misses are counted and the
//! relay only goes off on the miss that exceeds the threshold, so a watched
//! machine that drops off the network for a reboot keeps the compressor running.

use std::sync::Arc;

use tracing::{debug, error, info, trace};

use crate::RelayState;
use crate::relay::Relay;

/// Outcome of one debounce step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debounce {
    /// Watchlist device present
    Hit,
    /// Nothing present, still inside the grace window
    Holding,
    /// Nothing present and the grace window is used up
    Expired,
}

impl Debounce {
    /// Classifies a cycle given the miss count *after* it has been applied
    pub fn evaluate(watchlist_hit: bool, miss_count: u64, threshold: u64) -> Debounce {
        if watchlist_hit {
            return Debounce::Hit;
        }

        if miss_count <= threshold {
            return Debounce::Holding;
        }

        Debounce::Expired
    }
}

/// Owns the relay and the debounce state
pub struct ActuatorController {
    relay: Arc<dyn Relay>,
    state: RelayState,
    miss_count: u64,
    threshold: u64,

    /// Set when the last relay write failed; forces a rewrite on the next cycle
    out_of_sync: bool,
}

impl ActuatorController {
    /// Creates the controller and drives the relay to its inactive output
    pub async fn new(relay: Arc<dyn Relay>, threshold: u64) -> Self {
        let mut controller = Self {
            relay,
            state: RelayState::Off,
            miss_count: 0,
            threshold,
            out_of_sync: true,
        };
        controller.drive(RelayState::Off).await;
        controller
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn miss_count(&self) -> u64 {
        self.miss_count
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Feeds one monitor cycle into the state machine and returns the new state
    pub async fn apply(&mut self, watchlist_hit: bool) -> RelayState {
        if watchlist_hit {
            self.miss_count = 0;
        } else {
            self.miss_count = self.miss_count.saturating_add(1);
        }

        let evaluation = Debounce::evaluate(watchlist_hit, self.miss_count, self.threshold);
        let target = match evaluation {
            Debounce::Hit => RelayState::On,
            Debounce::Holding => self.state,
            Debounce::Expired => RelayState::Off,
        };

        trace!(
            "hit: {watchlist_hit} -> {evaluation:?} ({}/{})",
            self.miss_count, self.threshold
        );

        if evaluation == Debounce::Holding && self.state.is_on() {
            debug!(
                "no watchlist device, holding relay on ({}/{})",
                self.miss_count, self.threshold
            );
        }

        if target != self.state {
            info!("relay {} -> {target}", self.state);
            self.state = target;
            self.drive(target).await;
        } else if self.out_of_sync {
            debug!("retrying relay write ({target})");
            self.drive(target).await;
        }

        self.state
    }

    /// Switches the relay off regardless of the debounce state
    pub async fn shutdown(&mut self) {
        info!("forcing relay off");
        self.state = RelayState::Off;
        self.drive(RelayState::Off).await;
    }

    async fn drive(&mut self, state: RelayState) {
        match self.relay.set_output(state).await {
            Ok(()) => self.out_of_sync = false,
            Err(e) => {
                error!("failed to switch relay {state}: {e:#}");
                self.out_of_sync = true;
            }
        }
    }
}
