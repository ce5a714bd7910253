//! Host settings document and agent state reports
//!
//! The wire format is camelCase JSON. A [`HostSettings`] document is assembled
//! fresh for every synchronization request and is compared as a whole by the
//! agent to decide whether anything needs to be applied.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Desired configuration of one interface on the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceSettings {
    pub name: String,

    /// Address with prefix length (e.g. "10.0.0.2/24"), empty when unassigned
    #[serde(default)]
    pub address: String,

    #[serde(default)]
    pub listen_port: u16,

    #[serde(default)]
    pub table: Option<String>,

    #[serde(default)]
    pub dns: Vec<String>,

    #[serde(default)]
    pub mtu: Option<u32>,

    #[serde(default)]
    pub pre_up: Option<String>,

    #[serde(default)]
    pub post_up: Option<String>,

    #[serde(default)]
    pub pre_down: Option<String>,

    #[serde(default)]
    pub post_down: Option<String>,
}

/// Desired peer of one local interface
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PeerSettings {
    /// Name of the local interface this peer belongs to
    pub interface: String,

    pub public_key: String,

    /// Peer host's advertise address: bare IP, hostname or `host:port`
    #[serde(default)]
    pub address: String,

    /// Peer interface listen port, used when `address` carries no port
    #[serde(default)]
    pub port: u16,

    #[serde(default, rename = "allowedIPs")]
    pub allowed_ips: Vec<String>,

    #[serde(default)]
    pub persistent_keepalive: u16,
}

/// Complete desired configuration for one host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HostSettings {
    #[serde(default)]
    pub interfaces: Vec<InterfaceSettings>,

    #[serde(default)]
    pub peers: Vec<PeerSettings>,
}

impl HostSettings {
    /// Look up an interface entry by name
    pub fn interface(&self, name: &str) -> Option<&InterfaceSettings> {
        self.interfaces.iter().find(|iface| iface.name == name)
    }

    /// Peers attached to the named local interface, in document order
    pub fn peers_for<'a>(&'a self, interface: &'a str) -> impl Iterator<Item = &'a PeerSettings> {
        self.peers.iter().filter(move |peer| peer.interface == interface)
    }

    /// Copy of this document without the named interfaces or their peers
    pub fn without_interfaces(&self, names: &[String]) -> HostSettings {
        HostSettings {
            interfaces: self
                .interfaces
                .iter()
                .filter(|iface| !names.contains(&iface.name))
                .cloned()
                .collect(),
            peers: self
                .peers
                .iter()
                .filter(|peer| !names.contains(&peer.interface))
                .cloned()
                .collect(),
        }
    }
}

/// Locally observed state of one interface, as reported by an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceState {
    pub name: String,

    #[serde(default)]
    pub public_key: String,
}

/// Self-reported host state sent with every synchronization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HostState {
    #[serde(default)]
    pub interfaces: Vec<InterfaceState>,
}
