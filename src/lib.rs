pub mod actors;
pub mod api;
pub mod config;
pub mod controller;
pub mod probe;
pub mod relay;
pub mod resolver;
pub mod scanner;
pub mod snapshot;
pub mod util;

use std::collections::HashSet;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Output state of the compressor relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    On,
    #[default]
    Off,
}

impl RelayState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelayState::On => "On",
            RelayState::Off => "Off",
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, RelayState::On)
    }
}

impl std::fmt::Display for RelayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A host seen during one sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    pub address: Ipv4Addr,
    pub hostname: String,
    pub in_watchlist: bool,
}

/// Addresses whose presence keeps the compressor running
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Watchlist {
    addresses: HashSet<Ipv4Addr>,
}

impl Watchlist {
    pub fn new(addresses: impl IntoIterator<Item = Ipv4Addr>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
        }
    }

    pub fn contains(&self, address: &Ipv4Addr) -> bool {
        self.addresses.contains(address)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    /// Whether any of the given devices is on the watchlist
    pub fn is_hit(&self, devices: &[DiscoveredDevice]) -> bool {
        devices.iter().any(|device| self.contains(&device.address))
    }

    /// Sorted copy of the addresses, for logging and display
    pub fn sorted(&self) -> Vec<Ipv4Addr> {
        let mut addresses: Vec<_> = self.addresses.iter().copied().collect();
        addresses.sort_by_key(|address| u32::from(*address));
        addresses
    }
}

impl FromIterator<Ipv4Addr> for Watchlist {
    fn from_iter<T: IntoIterator<Item = Ipv4Addr>>(iter: T) -> Self {
        Self::new(iter)
    }
}
