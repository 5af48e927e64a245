use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, bail, ensure};
use tracing::trace;

use crate::Watchlist;

/// How a sweep that failed as a whole feeds the relay controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanFailurePolicy {
    /// Count the cycle as "no devices found" (the debounce window still applies)
    #[default]
    AssumeEmpty,
    /// Leave relay state and miss count untouched
    Hold,
}

/// Relay driver selection
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(tag = "driver", rename_all = "snake_case")]
pub enum RelayConfig {
    /// Log transitions only
    DryRun,

    /// GPIO line driven through the sysfs interface
    Sysfs {
        pin: u32,
        #[serde(default = "default_active_low")]
        active_low: bool,
    },
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig::DryRun
    }
}

fn default_active_low() -> bool {
    true
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub watchlist: Vec<Ipv4Addr>,
    pub interval: Option<u64>,
    pub off_delay_minutes: Option<u64>,
    pub pool_size: Option<usize>,
    pub probe_timeout_ms: Option<u64>,
    pub resolve_timeout_ms: Option<u64>,
    pub resolve_pause_ms: Option<u64>,

    /// Explicit network address of the /24 to sweep, bypasses own-address discovery
    pub subnet: Option<Ipv4Addr>,
    pub route_probe: Option<SocketAddr>,
    #[serde(default)]
    pub scan_failure_policy: ScanFailurePolicy,
    #[serde(default)]
    pub relay: RelayConfig,
    pub startup_delay_secs: Option<u64>,
    pub shutdown_grace_secs: Option<u64>,
    #[serde(default)]
    pub debug: bool,
}

/// Scanner settings with all defaults applied
#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub pool_size: usize,
    pub probe_timeout: Duration,
    pub resolve_timeout: Duration,
    pub resolve_pause: Duration,
    pub subnet: Option<Ipv4Addr>,
    pub route_probe: SocketAddr,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            probe_timeout: Duration::from_millis(DEFAULT_PROBE_TIMEOUT_MS),
            resolve_timeout: Duration::from_millis(DEFAULT_RESOLVE_TIMEOUT_MS),
            resolve_pause: Duration::from_millis(DEFAULT_RESOLVE_PAUSE_MS),
            subnet: None,
            route_probe: default_route_probe(),
        }
    }
}

/// Validated configuration handed to the monitor
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub watchlist: Watchlist,
    pub interval: Duration,
    pub off_threshold: u64,
    pub scan: ScanConfig,
    pub scan_failure_policy: ScanFailurePolicy,
    pub relay: RelayConfig,
    pub startup_delay: Duration,
    pub shutdown_grace: Duration,
    pub debug: bool,
}

const DEFAULT_INTERVAL_SECS: u64 = 120;
const DEFAULT_OFF_DELAY_MINUTES: u64 = 4;
const DEFAULT_POOL_SIZE: usize = 255;
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 1000;
const DEFAULT_RESOLVE_TIMEOUT_MS: u64 = 2000;
const DEFAULT_RESOLVE_PAUSE_MS: u64 = 100;
const DEFAULT_STARTUP_DELAY_SECS: u64 = 10;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

fn default_route_probe() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::new(192, 168, 229, 250), 80))
}

/// Number of consecutive empty cycles tolerated before the relay is switched off
pub fn off_threshold(off_delay_minutes: u64, interval_secs: u64) -> u64 {
    if interval_secs == 0 {
        return 0;
    }
    off_delay_minutes.saturating_mul(60) / interval_secs
}

impl Config {
    pub fn resolve(self) -> anyhow::Result<ResolvedConfig> {
        let interval = self.interval.unwrap_or(DEFAULT_INTERVAL_SECS);
        ensure!(interval > 0, "interval must be greater than zero");

        let pool_size = self.pool_size.unwrap_or(DEFAULT_POOL_SIZE);
        ensure!(pool_size > 0, "pool_size must be greater than zero");

        if let Some(subnet) = self.subnet
            && subnet.octets()[3] != 0
        {
            bail!("subnet must be a /24 network address (x.y.z.0), got {subnet}");
        }

        if let RelayConfig::Sysfs { pin, .. } = self.relay
            && pin > 1023
        {
            bail!("GPIO pin {pin} out of range");
        }

        let off_delay_minutes = self.off_delay_minutes.unwrap_or(DEFAULT_OFF_DELAY_MINUTES);

        Ok(ResolvedConfig {
            watchlist: Watchlist::new(self.watchlist),
            interval: Duration::from_secs(interval),
            off_threshold: off_threshold(off_delay_minutes, interval),
            scan: ScanConfig {
                pool_size,
                probe_timeout: Duration::from_millis(
                    self.probe_timeout_ms.unwrap_or(DEFAULT_PROBE_TIMEOUT_MS),
                ),
                resolve_timeout: Duration::from_millis(
                    self.resolve_timeout_ms.unwrap_or(DEFAULT_RESOLVE_TIMEOUT_MS),
                ),
                resolve_pause: Duration::from_millis(
                    self.resolve_pause_ms.unwrap_or(DEFAULT_RESOLVE_PAUSE_MS),
                ),
                subnet: self.subnet,
                route_probe: self.route_probe.unwrap_or_else(default_route_probe),
            },
            scan_failure_policy: self.scan_failure_policy,
            relay: self.relay,
            startup_delay: Duration::from_secs(
                self.startup_delay_secs.unwrap_or(DEFAULT_STARTUP_DELAY_SECS),
            ),
            shutdown_grace: Duration::from_secs(
                self.shutdown_grace_secs
                    .unwrap_or(DEFAULT_SHUTDOWN_GRACE_SECS),
            ),
            debug: self.debug,
        })
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    serde_json::from_str(&file_content)
        .context("Invalid configuration file provided!")
        .inspect(|config| trace!("loaded config: {config:?}"))
}
