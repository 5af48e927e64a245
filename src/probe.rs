//! Single-address reachability check

use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

/// One reachability check against one address.
///
/// Implementations never fail: anything that is not a positive answer is `false`.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn check(&self, address: Ipv4Addr) -> bool;
}

/// ICMP echo through the system `ping` binary (no raw-socket privileges needed)
#[derive(Debug, Clone)]
pub struct PingProbe {
    timeout: Duration,
}

impl PingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(&self, address: Ipv4Addr) -> Command {
        // ping only takes whole seconds for -W
        let wait_secs = self.timeout.as_secs().max(1);

        let mut command = Command::new("ping");
        command
            .arg("-c")
            .arg("1")
            .arg("-W")
            .arg(wait_secs.to_string())
            .arg(address.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl Probe for PingProbe {
    async fn check(&self, address: Ipv4Addr) -> bool {
        let mut command = self.command(address);

        match timeout(self.timeout, command.status()).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                trace!("{address}: failed to run ping: {e}");
                false
            }
            Err(_) => {
                trace!("{address}: ping timed out");
                false
            }
        }
    }
}
