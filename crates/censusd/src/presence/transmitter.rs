//! Beacon transmitter.
//!
//! Sends this node's beacon, waits `registry.interval()`, repeats. The wait
//! is recomputed every cycle, so beacons slow down as the swarm grows and
//! aggregate traffic stays near one datagram per second network-wide.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use anyhow::{Context, Result};
use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use census_services::NodeRegistry;

use super::interfaces;

/// Where beacons go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Targets {
    /// The broadcast address of every broadcast-capable interface,
    /// re-resolved each cycle so interfaces can come and go.
    Interfaces { port: u16 },
    /// One fixed address.
    Direct(SocketAddr),
}

impl Targets {
    fn resolve(&self) -> Vec<SocketAddr> {
        match self {
            Targets::Interfaces { port } => interfaces::broadcast_addresses()
                .into_iter()
                .map(|ip| SocketAddr::V4(SocketAddrV4::new(ip, *port)))
                .collect(),
            Targets::Direct(addr) => vec![*addr],
        }
    }

    fn domain(&self) -> Domain {
        match self {
            Targets::Direct(addr) => Domain::for_address(*addr),
            Targets::Interfaces { .. } => Domain::IPV4,
        }
    }
}

/// Broadcast `message` until shutdown.
///
/// Send failures are logged and the loop carries on; one bad interface
/// must not silence the node.
pub async fn transmit_loop(
    message: Bytes,
    targets: Targets,
    registry: NodeRegistry,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let socket = make_broadcast_socket(targets.domain())
        .context("failed to create beacon send socket")?;
    let socket = UdpSocket::from_std(socket).context("failed to convert to tokio UdpSocket")?;

    tracing::info!(?targets, bytes = message.len(), "beacon transmitter starting");

    loop {
        let wait = registry.interval().await;
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("beacon transmitter shutting down");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let destinations = targets.resolve();
        if destinations.is_empty() {
            tracing::debug!("no broadcast destinations this cycle");
        }
        for dest in destinations {
            match socket.send_to(&message, dest).await {
                Ok(n) => tracing::trace!(%dest, bytes = n, "beacon sent"),
                Err(e) => tracing::warn!(%dest, error = %e, "beacon send failed"),
            }
        }
    }
}

/// Create an unbound-port UDP socket allowed to send to broadcast addresses.
fn make_broadcast_socket(domain: Domain) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("socket()")?;

    let bind: SocketAddr = if domain == Domain::IPV6 {
        SocketAddr::from((std::net::Ipv6Addr::UNSPECIFIED, 0))
    } else {
        socket.set_broadcast(true).context("SO_BROADCAST")?;
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
    };
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket.bind(&bind.into()).context("bind()")?;

    Ok(socket.into())
}
