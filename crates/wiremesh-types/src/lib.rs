//! wiremesh types - topology records and synchronization documents
//!
//! Shared between the coordination server (`wiremesh-api`) and the host agent
//! (`wiremesh-agent`).
//!
//! - [`model`] - persisted records: networks, hosts, interfaces and links
//! - [`settings`] - the per-host document exchanged over `/hosts/self/*`

pub mod model;
pub mod settings;

pub use model::{Host, Interface, Link, Network, WireGuardExtras};
pub use settings::{
    HostSettings, HostState, InterfaceSettings, InterfaceState, PeerSettings,
};
