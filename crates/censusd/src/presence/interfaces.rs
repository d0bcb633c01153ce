//! Broadcast address discovery.
//!
//! Walks the host's interface addresses and returns the IPv4 broadcast
//! address of every interface that is up and broadcast-capable. An
//! interface that cannot be resolved is skipped, never fatal.

use std::net::{Ipv4Addr, SocketAddrV4};

use nix::ifaddrs::{getifaddrs, InterfaceAddress};
use nix::net::if_::InterfaceFlags;
use nix::sys::socket::SockaddrStorage;

/// Broadcast addresses of all usable interfaces, deduplicated.
pub fn broadcast_addresses() -> Vec<Ipv4Addr> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            tracing::warn!(error = %e, "failed to enumerate network interfaces");
            return Vec::new();
        }
    };

    let mut out = Vec::new();
    for ifa in addrs {
        if !ifa.flags.contains(InterfaceFlags::IFF_UP | InterfaceFlags::IFF_BROADCAST) {
            continue;
        }
        match interface_broadcast(&ifa) {
            Ok(Some(addr)) if !out.contains(&addr) => out.push(addr),
            Ok(_) => {}
            Err(reason) => {
                tracing::debug!(interface = %ifa.interface_name, reason, "skipping interface");
            }
        }
    }
    out
}

/// Ok(None) for non-IPv4 entries. Prefers the kernel-reported broadcast
/// address and falls back to computing it from the netmask.
fn interface_broadcast(ifa: &InterfaceAddress) -> Result<Option<Ipv4Addr>, &'static str> {
    let Some(addr) = ipv4(ifa.address.as_ref()) else {
        return Ok(None);
    };
    if let Some(broadcast) = ipv4(ifa.broadcast.as_ref()) {
        return Ok(Some(broadcast));
    }
    let mask = ipv4(ifa.netmask.as_ref()).ok_or("no IPv4 netmask")?;
    Ok(Some(subnet_broadcast(addr, mask)))
}

fn ipv4(storage: Option<&SockaddrStorage>) -> Option<Ipv4Addr> {
    let sin = storage?.as_sockaddr_in()?;
    Some(*SocketAddrV4::from(*sin).ip())
}

/// Last address of the subnet: host bits all set.
pub fn subnet_broadcast(addr: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    Ipv4Addr::from(u32::from(addr) | !u32::from(mask))
}
