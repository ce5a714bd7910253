//! Peer endpoint resolution
//!
//! A peer address is a bare IP, a hostname, or either of those with a port.
//! An explicit port always wins over the peer's advertised listen port.

use std::net::{IpAddr, SocketAddr};
use wiremesh_overlay::DEFAULT_WG_PORT;

use crate::error::{AgentError, Result};

/// Parsed but not yet resolved endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// No address advertised; the peer only dials in
    None,
    /// Literal socket address
    Addr(SocketAddr),
    /// Hostname needing a DNS lookup
    Host(String, u16),
}

/// Split `address` into an [`Endpoint`], filling in `port` when it has none
///
/// A `port` of 0 falls back to the default WireGuard port.
pub fn parse_endpoint(address: &str, port: u16) -> Endpoint {
    let address = address.trim();
    if address.is_empty() {
        return Endpoint::None;
    }
    let port = if port == 0 { DEFAULT_WG_PORT } else { port };

    if let Ok(addr) = address.parse::<SocketAddr>() {
        return Endpoint::Addr(addr);
    }
    let bare = address
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(address);
    if let Ok(ip) = bare.parse::<IpAddr>() {
        return Endpoint::Addr(SocketAddr::new(ip, port));
    }

    match address.rsplit_once(':') {
        Some((host, explicit)) if !host.contains(':') => match explicit.parse::<u16>() {
            Ok(explicit) => Endpoint::Host(host.to_string(), explicit),
            Err(_) => Endpoint::Host(address.to_string(), port),
        },
        _ => Endpoint::Host(address.to_string(), port),
    }
}

/// Resolve a peer address to a socket address
pub async fn resolve_endpoint(address: &str, port: u16) -> Result<Option<SocketAddr>> {
    match parse_endpoint(address, port) {
        Endpoint::None => Ok(None),
        Endpoint::Addr(addr) => Ok(Some(addr)),
        Endpoint::Host(host, port) => {
            let mut resolved = tokio::net::lookup_host((host.as_str(), port))
                .await
                .map_err(|e| AgentError::Endpoint {
                    address: address.to_string(),
                    reason: e.to_string(),
                })?
                .collect::<Vec<_>>();
            resolved.sort_by_key(|addr| !addr.is_ipv4());

            resolved
                .into_iter()
                .next()
                .map(Some)
                .ok_or_else(|| AgentError::Endpoint {
                    address: address.to_string(),
                    reason: "no addresses returned".into(),
                })
        }
    }
}
