//! Concurrent sweep of the local /24
//!
//! ## Flow
//!
//! ```text
//! own address → /24 → producer → job queue → N probe workers → results
//!                                                                  │
//!                      DiscoveredDevice list ← tag ← resolve ← sort
//! ```
//!
//! Every probe completes (or times out) before resolution starts, and the
//! returned list is always sorted by numeric address value.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use futures::future::join_all;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, instrument, trace, warn};

use crate::config::ScanConfig;
use crate::probe::{PingProbe, Probe};
use crate::resolver::{Resolver, SystemResolver};
use crate::util::AbortOnDrop;
use crate::{DiscoveredDevice, Watchlist};

/// Time allowed for own-address discovery
const LOCAL_ADDRESS_TIMEOUT: Duration = Duration::from_secs(2);

/// A /24 network
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subnet {
    network: Ipv4Addr,
}

impl Subnet {
    /// The /24 containing `address`
    pub fn containing(address: Ipv4Addr) -> Self {
        let [a, b, c, _] = address.octets();
        Self {
            network: Ipv4Addr::new(a, b, c, 0),
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    /// Host addresses `.1` through `.254`
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + Send + 'static {
        let [a, b, c, _] = self.network.octets();
        (1..=254u8).map(move |d| Ipv4Addr::new(a, b, c, d))
    }
}

impl std::fmt::Display for Subnet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/24", self.network)
    }
}

/// Finds the address this host uses to reach `route_probe`.
///
/// Connecting a UDP socket only selects a route; nothing is sent, so the
/// target does not need to exist.
pub async fn local_address(route_probe: SocketAddr) -> Result<Ipv4Addr> {
    let lookup = async {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("failed to bind UDP socket")?;
        socket
            .connect(route_probe)
            .await
            .with_context(|| format!("no route towards {route_probe}"))?;
        socket.local_addr().context("failed to read local address")
    };

    let local = tokio::time::timeout(LOCAL_ADDRESS_TIMEOUT, lookup)
        .await
        .context("timed out determining own address")??;

    match local.ip() {
        IpAddr::V4(address) if !address.is_unspecified() => Ok(address),
        other => bail!("unusable local address {other}"),
    }
}

/// The /24 this host lives in
pub async fn local_subnet(route_probe: SocketAddr) -> Result<Subnet> {
    let address = local_address(route_probe).await?;
    trace!("own address: {address}");
    Ok(Subnet::containing(address))
}

/// One full pass over the network, as seen by the monitor loop
#[async_trait]
pub trait Sweep: Send + Sync {
    /// Reachable devices sorted by numeric address.
    ///
    /// An error means the sweep as a whole could not run.
    async fn sweep(&self) -> Result<Vec<DiscoveredDevice>>;
}

pub struct Scanner {
    config: ScanConfig,
    watchlist: Watchlist,
    probe: Arc<dyn Probe>,
    resolver: Arc<dyn Resolver>,
}

impl Scanner {
    pub fn new(
        config: ScanConfig,
        watchlist: Watchlist,
        probe: Arc<dyn Probe>,
        resolver: Arc<dyn Resolver>,
    ) -> Self {
        Self {
            config,
            watchlist,
            probe,
            resolver,
        }
    }

    /// Scanner backed by the system `ping` and resolver
    pub fn with_system_tools(config: ScanConfig, watchlist: Watchlist) -> Self {
        let probe = Arc::new(PingProbe::new(config.probe_timeout));
        let resolver = Arc::new(SystemResolver::new(config.resolve_timeout));
        Self::new(config, watchlist, probe, resolver)
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    /// The configured subnet, or the one discovered from the own address
    pub async fn subnet(&self) -> Result<Subnet> {
        match self.config.subnet {
            Some(network) => Ok(Subnet::containing(network)),
            None => local_subnet(self.config.route_probe).await,
        }
    }

    #[instrument(skip(self), fields(subnet = %subnet, pool = self.config.pool_size))]
    pub async fn sweep_subnet(&self, subnet: Subnet) -> Vec<DiscoveredDevice> {
        let reachable = self.probe_all(subnet.hosts().collect()).await;
        debug!("{} hosts reachable", reachable.len());
        self.annotate(reachable).await
    }

    /// Probes every candidate on a bounded worker pool.
    ///
    /// Returns the reachable addresses sorted by numeric value. Dropping the
    /// future aborts the producer and every worker, which kills their `ping`
    /// children.
    pub async fn probe_all(&self, candidates: Vec<Ipv4Addr>) -> Vec<Ipv4Addr> {
        let workers = self.config.pool_size.min(candidates.len());
        if workers == 0 {
            return vec![];
        }

        let (job_tx, job_rx) = mpsc::channel::<Ipv4Addr>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<Ipv4Addr>();

        // dropping the sender once everything is queued is the drain signal
        let producer = AbortOnDrop::new(tokio::spawn(async move {
            for address in candidates {
                if job_tx.send(address).await.is_err() {
                    break;
                }
            }
        }));

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let job_rx = Arc::clone(&job_rx);
                let result_tx = result_tx.clone();
                let probe = Arc::clone(&self.probe);

                AbortOnDrop::new(tokio::spawn(async move {
                    loop {
                        let next = job_rx.lock().await.recv().await;
                        let Some(address) = next else {
                            break;
                        };

                        if probe.check(address).await {
                            trace!("{address}: reachable");
                            // receiver outlives every worker
                            let _ = result_tx.send(address);
                        }
                    }
                }))
            })
            .collect();

        // only workers may hold the queue and result channel from here on
        drop(job_rx);
        drop(result_tx);

        for result in join_all(handles).await {
            if let Err(e) = result {
                warn!("probe worker failed: {e}");
            }
        }
        if let Err(e) = producer.await {
            warn!("job producer failed: {e}");
        }

        let mut reachable = Vec::new();
        while let Some(address) = result_rx.recv().await {
            reachable.push(address);
        }

        reachable.sort_unstable_by_key(|address| u32::from(*address));
        reachable.dedup();
        reachable
    }

    /// Resolves hostnames one after another and tags watchlist membership
    async fn annotate(&self, addresses: Vec<Ipv4Addr>) -> Vec<DiscoveredDevice> {
        let mut devices = Vec::with_capacity(addresses.len());

        for (index, address) in addresses.into_iter().enumerate() {
            if index > 0 && !self.config.resolve_pause.is_zero() {
                tokio::time::sleep(self.config.resolve_pause).await;
            }

            let hostname = self.resolver.resolve(address).await;
            let in_watchlist = self.watchlist.contains(&address);
            trace!("{address}: {hostname} (watchlist: {in_watchlist})");

            devices.push(DiscoveredDevice {
                address,
                hostname,
                in_watchlist,
            });
        }

        devices
    }
}

#[async_trait]
impl Sweep for Scanner {
    async fn sweep(&self) -> Result<Vec<DiscoveredDevice>> {
        let subnet = self.subnet().await?;
        Ok(self.sweep_subnet(subnet).await)
    }
}
