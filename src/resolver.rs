//! Reverse name lookup with a sentinel fallback

use std::net::Ipv4Addr;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::trace;

/// Hostname reported when reverse lookup fails
pub const UNKNOWN_HOSTNAME: &str = "#Unknown";

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Returns the hostname or [`UNKNOWN_HOSTNAME`]; never fails
    async fn resolve(&self, address: Ipv4Addr) -> String;
}

/// Asks the system resolver through `getent hosts`, so `/etc/hosts`, DNS and
/// mDNS are consulted in nsswitch order.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    timeout: Duration,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn lookup(&self, address: Ipv4Addr) -> Option<String> {
        let output = Command::new("getent")
            .arg("hosts")
            .arg(address.to_string())
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                trace!("{address}: failed to run getent: {e}");
                return None;
            }
            Err(_) => {
                trace!("{address}: reverse lookup timed out");
                return None;
            }
        };

        if !output.status.success() {
            return None;
        }

        parse_getent_hosts(&String::from_utf8_lossy(&output.stdout), address)
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn resolve(&self, address: Ipv4Addr) -> String {
        self.lookup(address)
            .await
            .unwrap_or_else(|| UNKNOWN_HOSTNAME.to_string())
    }
}

/// Extracts the canonical name from `getent hosts` output (`<ip> <name> [aliases...]`)
fn parse_getent_hosts(output: &str, address: Ipv4Addr) -> Option<String> {
    let address = address.to_string();

    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        if fields.next()? != address {
            return None;
        }
        let name = fields.next()?.trim_end_matches('.');
        (!name.is_empty() && name != address).then(|| name.to_string())
    })
}
