//! Network utility functions
//!
//! Host resolution and local port probing used by the daemon supervisor and
//! the rule installer.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use log::debug;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Resolves host names to IPv4 addresses
#[cfg_attr(test, mockall::automock)]
pub trait HostResolver {
    /// Resolve `host` to the first IPv4 address it maps to
    fn resolve_ipv4(&self, host: &str) -> Option<Ipv4Addr>;
}

/// Resolver backed by the system's name service
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve_ipv4(&self, host: &str) -> Option<Ipv4Addr> {
        // Literal addresses never hit the resolver
        if let Ok(ip) = host.parse::<IpAddr>() {
            return match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            };
        }

        match (host, 0u16).to_socket_addrs() {
            Ok(addrs) => {
                let found = addrs
                    .filter_map(|addr| match addr {
                        SocketAddr::V4(v4) => Some(*v4.ip()),
                        SocketAddr::V6(_) => None,
                    })
                    .next();
                debug!("Resolved {} to {:?}", host, found);
                found
            }
            Err(e) => {
                debug!("Failed to resolve {}: {}", host, e);
                None
            }
        }
    }
}

/// Check whether something accepts TCP connections on `addr`
///
/// # Arguments
///
/// * `addr` - Address to connect to
/// * `limit` - Upper bound for the connection attempt
pub async fn port_accepts(addr: SocketAddr, limit: Duration) -> bool {
    matches!(timeout(limit, TcpStream::connect(addr)).await, Ok(Ok(_)))
}
