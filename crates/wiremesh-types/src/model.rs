//! Persisted topology records
//!
//! These are the system of record. Everything the coordinator derives (address
//! pools, host settings documents) can be rebuilt from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// An overlay network owning one IPv4 address range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Network {
    /// Network identifier
    pub id: Uuid,

    /// Human readable name
    pub name: String,

    /// Address range in CIDR notation (e.g. "10.0.0.0/24")
    pub ip_address_range: String,

    #[schema(value_type = String, example = "2026-01-27T12:00:00Z")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, example = "2026-01-27T12:00:00Z")]
    pub updated_at: DateTime<Utc>,
}

impl Network {
    /// Create a new network record with a fresh identifier
    pub fn new(name: impl Into<String>, ip_address_range: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ip_address_range: ip_address_range.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

/// A managed machine running the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Host {
    pub id: Uuid,

    /// Network this host primarily belongs to
    #[serde(default)]
    pub network_id: Option<Uuid>,

    pub name: String,

    /// Public endpoint peers use to reach this host: a bare IP, a hostname, or
    /// `host:port`
    #[serde(default)]
    pub advertise_address: String,

    #[schema(value_type = String, example = "2026-01-27T12:00:00Z")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, example = "2026-01-27T12:00:00Z")]
    pub updated_at: DateTime<Utc>,
}

impl Host {
    pub fn new(name: impl Into<String>, advertise_address: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            network_id: None,
            name: name.into(),
            advertise_address: advertise_address.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Attach the host to a network
    pub fn with_network(mut self, network_id: Uuid) -> Self {
        self.network_id = Some(network_id);
        self
    }
}

/// Optional wg-quick style settings carried through to the agent verbatim
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct WireGuardExtras {
    /// Routing table ("auto", "off" or a table number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    /// DNS servers pushed to the interface
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtu: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_up: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_up: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_down: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_down: Option<String>,
}

/// One WireGuard endpoint on a host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Interface {
    pub id: Uuid,

    /// Owning host
    pub host_id: Uuid,

    /// Network the address is leased from
    #[serde(default)]
    pub network_id: Option<Uuid>,

    /// Interface name on the host (e.g. "wg0")
    pub name: String,

    /// Assigned address with prefix length (e.g. "10.0.0.2/24")
    #[serde(default)]
    pub ip_address: Option<String>,

    #[serde(default)]
    pub listen_port: u16,

    /// Base64 public key reported by the agent
    #[serde(default)]
    pub public_key: String,

    #[serde(flatten)]
    pub extras: WireGuardExtras,

    #[schema(value_type = String, example = "2026-01-27T12:00:00Z")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, example = "2026-01-27T12:00:00Z")]
    pub updated_at: DateTime<Utc>,
}

impl Interface {
    pub fn new(host_id: Uuid, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            host_id,
            network_id: None,
            name: name.into(),
            ip_address: None,
            listen_port: 0,
            public_key: String::new(),
            extras: WireGuardExtras::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_network(mut self, network_id: Uuid) -> Self {
        self.network_id = Some(network_id);
        self
    }

    pub fn with_address(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = Some(ip_address.into());
        self
    }

    pub fn with_listen_port(mut self, listen_port: u16) -> Self {
        self.listen_port = listen_port;
        self
    }

    pub fn with_public_key(mut self, public_key: impl Into<String>) -> Self {
        self.public_key = public_key.into();
        self
    }

    /// The assigned address, treating an empty string as unassigned
    pub fn assigned_address(&self) -> Option<&str> {
        self.ip_address.as_deref().filter(|addr| !addr.trim().is_empty())
    }

    /// Bump the modification timestamp
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A directional peering record between two interfaces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Link {
    pub id: Uuid,

    pub network_id: Uuid,

    /// Interface whose host receives the peer entry
    pub from_interface_id: Uuid,

    /// Interface described by the peer entry
    pub to_interface_id: Uuid,

    /// CIDRs routed to the peer
    #[serde(default)]
    pub allowed_ips: Vec<String>,

    /// Keepalive interval in seconds, 0 disables it
    #[serde(default)]
    pub persistent_keepalive: u16,

    #[schema(value_type = String, example = "2026-01-27T12:00:00Z")]
    pub created_at: DateTime<Utc>,

    #[schema(value_type = String, example = "2026-01-27T12:00:00Z")]
    pub updated_at: DateTime<Utc>,
}

impl Link {
    pub fn new(network_id: Uuid, from_interface_id: Uuid, to_interface_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            network_id,
            from_interface_id,
            to_interface_id,
            allowed_ips: Vec::new(),
            persistent_keepalive: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_allowed_ips<I, S>(mut self, allowed_ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_ips = allowed_ips.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_keepalive(mut self, seconds: u16) -> Self {
        self.persistent_keepalive = seconds;
        self
    }
}
