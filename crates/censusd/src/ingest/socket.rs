//! Resilient beacon listener socket.
//!
//! A failed receive is followed by a fixed backoff and a rebind of the
//! listening socket. Only after `max_attempts` consecutive failures does
//! `read` give up, at which point the listener is considered unusable.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// A datagram source that can be re-opened after a failure.
pub trait Endpoint: Send {
    /// Receive one datagram into `buf`, returning its length.
    fn recv(&mut self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;

    /// Replace the underlying socket with a freshly bound one.
    fn rebind(&mut self) -> impl Future<Output = io::Result<()>> + Send;
}

// ── UDP endpoint ──────────────────────────────────────────────────────────────

/// UDP listener bound with SO_REUSEADDR so a rebind can reclaim the port
/// and several nodes on one host can share it.
pub struct UdpEndpoint {
    addr: SocketAddr,
    socket: UdpSocket,
}

impl UdpEndpoint {
    /// Bind the listener. Must be called inside a tokio runtime.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::from_std(make_listener_socket(addr)?)?;
        // Pin the concrete port so rebinds after a port-0 bind land on it.
        let addr = socket.local_addr()?;
        Ok(Self { addr, socket })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Endpoint for UdpEndpoint {
    async fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let (len, _from) = self.socket.recv_from(buf).await?;
        Ok(len)
    }

    async fn rebind(&mut self) -> io::Result<()> {
        self.socket = UdpSocket::from_std(make_listener_socket(self.addr)?)?;
        tracing::info!(addr = %self.addr, "beacon listener rebound");
        Ok(())
    }
}

/// Create a non-blocking UDP socket that accepts broadcast datagrams.
fn make_listener_socket(addr: SocketAddr) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    if addr.is_ipv4() {
        socket.set_broadcast(true)?;
    }
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    Ok(socket.into())
}

// ── Retry policy ──────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("beacon receive failed {attempts} times in a row: {source}")]
    Exhausted { attempts: u32, source: io::Error },
}

pub struct ResilientSocket<E> {
    endpoint: E,
    max_attempts: u32,
    backoff: Duration,
}

impl<E: Endpoint> ResilientSocket<E> {
    pub fn new(endpoint: E, max_attempts: u32, backoff: Duration) -> Self {
        Self {
            endpoint,
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Receive one datagram, retrying through transient failures.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, SocketError> {
        let mut attempt = 1;
        loop {
            match self.endpoint.recv(buf).await {
                Ok(len) => return Ok(len),
                Err(source) if attempt >= self.max_attempts => {
                    return Err(SocketError::Exhausted {
                        attempts: attempt,
                        source,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        max_attempts = self.max_attempts,
                        "beacon receive failed, rebinding"
                    );
                    tokio::time::sleep(self.backoff).await;
                    if let Err(e) = self.endpoint.rebind().await {
                        tracing::warn!(error = %e, "rebind failed");
                    }
                    attempt += 1;
                }
            }
        }
    }
}
