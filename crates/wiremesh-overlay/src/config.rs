//! Low-level interface and peer configuration handed to a controller

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::time::Duration;

/// Default WireGuard listen port
pub const DEFAULT_WG_PORT: u16 = 51820;

/// Kernel limit on interface names (IFNAMSIZ - 1)
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

/// Resolved configuration of a single peer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerConfig {
    /// Peer public key (base64)
    pub public_key: String,

    /// Resolved endpoint, `None` when the peer only dials in
    pub endpoint: Option<SocketAddr>,

    /// Networks routed to this peer
    pub allowed_ips: Vec<IpNet>,

    /// Persistent keepalive interval, `None` disables it
    pub persistent_keepalive: Option<Duration>,
}

impl PeerConfig {
    pub fn new(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            endpoint: None,
            allowed_ips: Vec::new(),
            persistent_keepalive: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: SocketAddr) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    pub fn with_allowed_ips(mut self, allowed_ips: Vec<IpNet>) -> Self {
        self.allowed_ips = allowed_ips;
        self
    }

    /// Set the keepalive in seconds, 0 disables it
    pub fn with_keepalive_secs(mut self, secs: u16) -> Self {
        self.persistent_keepalive = (secs > 0).then(|| Duration::from_secs(u64::from(secs)));
        self
    }

    /// Render the peer as a wg-quick `[Peer]` section
    pub fn to_wg_config(&self) -> String {
        let mut out = format!("[Peer]\nPublicKey = {}\n", self.public_key);
        if let Some(endpoint) = self.endpoint {
            let _ = writeln!(out, "Endpoint = {}", endpoint);
        }
        if !self.allowed_ips.is_empty() {
            let ips: Vec<String> = self.allowed_ips.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "AllowedIPs = {}", ips.join(", "));
        }
        if let Some(keepalive) = self.persistent_keepalive {
            let _ = writeln!(out, "PersistentKeepalive = {}", keepalive.as_secs());
        }
        out
    }
}

/// Shell hooks run around interface changes (wg-quick semantics)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceHooks {
    pub pre_up: Option<String>,
    pub post_up: Option<String>,
    pub pre_down: Option<String>,
    pub post_down: Option<String>,
}

/// Complete configuration of one local interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    /// Interface name (at most 15 characters)
    pub name: String,

    /// Overlay address with prefix, `None` leaves addressing untouched
    pub address: Option<IpNet>,

    /// Listen port, 0 lets the device choose
    pub listen_port: u16,

    /// Private key (base64)
    pub private_key: String,

    /// Complete peer set; applying replaces whatever peers the device had
    pub peers: Vec<PeerConfig>,

    /// Routing table for allowed-IP routes ("off" disables route management)
    pub table: Option<String>,

    pub dns: Vec<String>,

    pub mtu: Option<u32>,

    pub hooks: InterfaceHooks,
}

impl InterfaceConfig {
    pub fn new(name: impl Into<String>, private_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: None,
            listen_port: 0,
            private_key: private_key.into(),
            peers: Vec::new(),
            table: None,
            dns: Vec::new(),
            mtu: None,
            hooks: InterfaceHooks::default(),
        }
    }

    /// Whether routes for peer allowed IPs should be installed
    pub fn manages_routes(&self) -> bool {
        !matches!(self.table.as_deref(), Some("off"))
    }

    /// Explicit routing table id, if one was configured
    pub fn route_table(&self) -> Option<&str> {
        self.table
            .as_deref()
            .filter(|table| !matches!(*table, "auto" | "off" | "main"))
    }
}

/// Validate an interface name against kernel constraints
pub fn validate_interface_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_INTERFACE_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
