use std::net::{Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::{JoinError, JoinHandle};

const PRESSURE_PORT: &str = "PRESSURE_PORT";

const DEFAULT_PORT: u16 = 80;

pub fn get_port() -> u16 {
    let port_from_env = std::env::var(PRESSURE_PORT);
    port_from_env.map_or(DEFAULT_PORT, |res| res.parse().unwrap_or(DEFAULT_PORT))
}

const PRESSURE_ADDR: &str = "PRESSURE_ADDR";

const DEFAULT_ADDR: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

pub fn get_addr() -> Ipv4Addr {
    let addr_from_env = std::env::var(PRESSURE_ADDR);
    addr_from_env.map_or(DEFAULT_ADDR, |res| res.parse().unwrap_or(DEFAULT_ADDR))
}

pub fn get_bind_addr() -> SocketAddr {
    SocketAddr::from((get_addr(), get_port()))
}

/// Name of this machine, shown on the status page
pub fn local_host_name() -> String {
    sysinfo::System::host_name().unwrap_or_else(|| String::from("unknown"))
}

/// Owns a spawned task and aborts it when dropped.
///
/// Dropping a plain `JoinHandle` detaches the task; work started for a cycle
/// must not outlive that cycle.
#[derive(Debug)]
pub struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    pub fn new(handle: JoinHandle<T>) -> Self {
        Self(handle)
    }

    /// Aborts the task and waits until it has actually stopped
    pub async fn cancel(mut self) {
        self.0.abort();
        let _ = (&mut self.0).await;
    }
}

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}
