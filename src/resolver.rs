//! Destination Resolution
//!
//! Turns the remote host string and port into a connectable address once at
//! startup. The host is tried as an IPv4 literal first, then as an IPv6
//! literal; anything else goes through DNS with IPv4 results preferred over
//! IPv6, keeping the v4-first policy at lookup time as well.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{bail, Context};
use tokio::net::lookup_host;
use tracing::debug;

use crate::Result;

/// The fixed remote address every inbound connection is forwarded to.
///
/// Resolved once at startup and shared read-only by every session.
#[derive(Debug, Clone)]
pub struct Destination {
    host: String,
    addr: SocketAddr,
}

impl Destination {
    /// Resolve a host string and port into a destination
    pub async fn resolve(host: &str, port: u16) -> Result<Self> {
        let addr = if let Ok(v4) = host.parse::<Ipv4Addr>() {
            SocketAddr::new(IpAddr::V4(v4), port)
        } else if let Ok(v6) = host.parse::<Ipv6Addr>() {
            SocketAddr::new(IpAddr::V6(v6), port)
        } else {
            Self::lookup(host, port).await?
        };

        debug!("Resolved destination {}:{} to {}", host, port, addr);

        Ok(Self {
            host: host.to_string(),
            addr,
        })
    }

    /// DNS lookup for non-literal hosts, preferring IPv4 addresses
    async fn lookup(host: &str, port: u16) -> Result<SocketAddr> {
        let addrs: Vec<SocketAddr> = lookup_host((host, port))
            .await
            .with_context(|| format!("failed to resolve host {host}"))?
            .collect();

        match addrs.iter().find(|a| a.is_ipv4()).or_else(|| addrs.first()) {
            Some(addr) => Ok(*addr),
            None => bail!("DNS resolution returned no addresses for {host}"),
        }
    }

    /// The resolved socket address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The host string as given on the command line
    pub fn host(&self) -> &str {
        &self.host
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host == self.addr.ip().to_string() {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{} ({})", self.host, self.addr)
        }
    }
}
