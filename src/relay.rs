//! Relay output capability
//!
//! The controller only knows about [`Relay::set_output`]. Writing the same state
//! twice must leave the hardware unchanged.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::RelayState;
use crate::config::RelayConfig;

#[async_trait]
pub trait Relay: Send + Sync {
    async fn set_output(&self, state: RelayState) -> Result<()>;
}

/// Builds the relay selected in the configuration
pub async fn from_config(config: &RelayConfig) -> Result<Arc<dyn Relay>> {
    match config {
        RelayConfig::DryRun => Ok(Arc::new(DryRunRelay::default())),
        RelayConfig::Sysfs { pin, active_low } => {
            let relay = SysfsRelay::export(*pin, *active_low).await?;
            Ok(Arc::new(relay))
        }
    }
}

/// Logs transitions instead of touching hardware
#[derive(Debug, Default)]
pub struct DryRunRelay {
    writes: Mutex<Vec<RelayState>>,
}

impl DryRunRelay {
    /// Every state written so far, oldest first
    pub fn writes(&self) -> Vec<RelayState> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<RelayState> {
        self.writes().last().copied()
    }
}

#[async_trait]
impl Relay for DryRunRelay {
    async fn set_output(&self, state: RelayState) -> Result<()> {
        info!("relay (dry run) -> {state}");
        if let Ok(mut writes) = self.writes.lock() {
            writes.push(state);
        }
        Ok(())
    }
}

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// A GPIO line driven through `/sys/class/gpio`.
///
/// Relay boards are usually active-low: the coil is energised while the line
/// is LOW.
#[derive(Debug)]
pub struct SysfsRelay {
    value_path: PathBuf,
    active_low: bool,
}

impl SysfsRelay {
    /// Exports `pin` and configures it as an output
    pub async fn export(pin: u32, active_low: bool) -> Result<Self> {
        Self::export_at(Path::new(SYSFS_GPIO_ROOT), pin, active_low).await
    }

    async fn export_at(root: &Path, pin: u32, active_low: bool) -> Result<Self> {
        let pin_dir = root.join(format!("gpio{pin}"));

        if !tokio::fs::try_exists(&pin_dir).await.unwrap_or(false) {
            debug!("exporting GPIO {pin}");
            tokio::fs::write(root.join("export"), pin.to_string())
                .await
                .with_context(|| format!("failed to export GPIO {pin}"))?;
        }

        // the initial level is the inactive one, so exporting never energises the coil
        let initial = if active_low { "high" } else { "low" };
        tokio::fs::write(pin_dir.join("direction"), initial)
            .await
            .with_context(|| format!("failed to set direction of GPIO {pin}"))?;

        Ok(Self {
            value_path: pin_dir.join("value"),
            active_low,
        })
    }

    fn level(&self, state: RelayState) -> &'static str {
        match (state.is_on(), self.active_low) {
            (true, true) | (false, false) => "0",
            (true, false) | (false, true) => "1",
        }
    }
}

#[async_trait]
impl Relay for SysfsRelay {
    async fn set_output(&self, state: RelayState) -> Result<()> {
        let level = self.level(state);
        debug!("relay -> {state} (level {level})");
        tokio::fs::write(&self.value_path, level)
            .await
            .with_context(|| format!("failed to write {}", self.value_path.display()))
    }
}
