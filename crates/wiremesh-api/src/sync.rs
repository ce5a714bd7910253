//! Host settings assembly
//!
//! Turns the interface and link records of one host into the [`HostSettings`]
//! document its agent converges to, and folds agent state reports back into
//! the records.
//!
//! Interface and link pages are fetched independently and peers are resolved
//! one lookup at a time, so a document is not an atomic snapshot. A topology
//! change racing with assembly shows up in the next sync at the latest.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use wiremesh_types::{
    HostSettings, HostState, Interface, InterfaceSettings, InterfaceState, Link, PeerSettings,
};

use crate::storage::{
    HostRepository, InterfaceRepository, LinkRepository, PageRequest, Repositories, StorageError,
};

/// Default number of records fetched per page
pub const DEFAULT_SYNC_PAGE_SIZE: u32 = 100;

/// Assembly errors
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Host not found: {0}")]
    HostNotFound(Uuid),

    #[error("Repository error: {0}")]
    Repository(#[from] StorageError),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// Builds per-host settings documents
pub struct SyncAssembler {
    hosts: Arc<dyn HostRepository>,
    interfaces: Arc<dyn InterfaceRepository>,
    links: Arc<dyn LinkRepository>,
    page_size: u32,
    unknown_reports: AtomicU64,
}

impl SyncAssembler {
    pub fn new(repos: &Repositories) -> Self {
        Self {
            hosts: repos.hosts.clone(),
            interfaces: repos.interfaces.clone(),
            links: repos.links.clone(),
            page_size: DEFAULT_SYNC_PAGE_SIZE,
            unknown_reports: AtomicU64::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Number of reported interfaces skipped because the host has no such
    /// interface on record
    pub fn unknown_reports(&self) -> u64 {
        self.unknown_reports.load(Ordering::Relaxed)
    }

    /// Assemble the settings document for a host
    ///
    /// Interfaces come first in record order, then one peer per link whose
    /// source interface lives on the host. Links pointing at a deleted
    /// interface or host are skipped.
    pub async fn get_host_settings(&self, host_id: Uuid) -> Result<HostSettings> {
        self.ensure_host(host_id).await?;

        let interfaces = self
            .host_interfaces(host_id)
            .await?
            .iter()
            .map(interface_settings)
            .collect();

        let mut peers = Vec::new();
        let mut request = PageRequest::first(self.page_size);
        loop {
            let page = self
                .links
                .find_all_by_source_host_id(host_id, request)
                .await?;
            for link in &page.items {
                if let Some(peer) = self.resolve_peer(link).await? {
                    peers.push(peer);
                }
            }
            if !page.page_info.has_next() {
                break;
            }
            request = request.next();
        }

        Ok(HostSettings { interfaces, peers })
    }

    /// Merge reported public keys into the host's interface records
    ///
    /// Only the public key is taken from a report. Interfaces the host does not
    /// have on record are skipped. Returns the state that was accepted.
    pub async fn update_host_state(&self, host_id: Uuid, report: &HostState) -> Result<HostState> {
        self.ensure_host(host_id).await?;

        let mut by_name: HashMap<String, Interface> = self
            .host_interfaces(host_id)
            .await?
            .into_iter()
            .map(|i| (i.name.clone(), i))
            .collect();

        let mut accepted = Vec::new();
        for reported in &report.interfaces {
            let Some(interface) = by_name.get_mut(&reported.name) else {
                self.unknown_reports.fetch_add(1, Ordering::Relaxed);
                debug!(host = %host_id, interface = %reported.name, "Skipping report for unknown interface");
                continue;
            };

            if !reported.public_key.is_empty() && interface.public_key != reported.public_key {
                interface.public_key = reported.public_key.clone();
                interface.touch();
                self.interfaces.update(interface).await?;
                debug!(host = %host_id, interface = %interface.name, "Updated interface public key");
            }

            accepted.push(InterfaceState {
                name: interface.name.clone(),
                public_key: interface.public_key.clone(),
            });
        }

        Ok(HostState {
            interfaces: accepted,
        })
    }

    /// Apply a state report, then assemble the resulting document
    pub async fn synchronize_host(&self, host_id: Uuid, report: &HostState) -> Result<HostSettings> {
        self.update_host_state(host_id, report).await?;
        self.get_host_settings(host_id).await
    }

    async fn ensure_host(&self, host_id: Uuid) -> Result<()> {
        match self.hosts.get_by_id(host_id).await? {
            Some(_) => Ok(()),
            None => Err(SyncError::HostNotFound(host_id)),
        }
    }

    async fn host_interfaces(&self, host_id: Uuid) -> Result<Vec<Interface>> {
        let mut interfaces = Vec::new();
        let mut request = PageRequest::first(self.page_size);
        loop {
            let page = self
                .interfaces
                .find_all_by_host_id(host_id, request)
                .await?;
            interfaces.extend(page.items);
            if !page.page_info.has_next() {
                break;
            }
            request = request.next();
        }
        Ok(interfaces)
    }

    async fn resolve_peer(&self, link: &Link) -> Result<Option<PeerSettings>> {
        let Some(source) = self.interfaces.get_by_id(link.from_interface_id).await? else {
            warn!(link = %link.id, interface = %link.from_interface_id, "Link source interface missing");
            return Ok(None);
        };
        let Some(peer) = self.interfaces.get_by_id(link.to_interface_id).await? else {
            warn!(link = %link.id, interface = %link.to_interface_id, "Link peer interface missing");
            return Ok(None);
        };
        let Some(peer_host) = self.hosts.get_by_id(peer.host_id).await? else {
            warn!(link = %link.id, host = %peer.host_id, "Link peer host missing");
            return Ok(None);
        };

        Ok(Some(PeerSettings {
            interface: source.name,
            public_key: peer.public_key,
            address: peer_host.advertise_address,
            port: peer.listen_port,
            allowed_ips: link.allowed_ips.clone(),
            persistent_keepalive: link.persistent_keepalive,
        }))
    }
}

fn interface_settings(interface: &Interface) -> InterfaceSettings {
    let extras = &interface.extras;
    InterfaceSettings {
        name: interface.name.clone(),
        address: interface.assigned_address().unwrap_or_default().to_string(),
        listen_port: interface.listen_port,
        table: extras.table.clone(),
        dns: extras.dns.clone(),
        mtu: extras.mtu,
        pre_up: extras.pre_up.clone(),
        post_up: extras.post_up.clone(),
        pre_down: extras.pre_down.clone(),
        post_down: extras.post_down.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use wiremesh_types::{Host, Network};

    struct Fixture {
        store: Arc<InMemoryStore>,
        assembler: SyncAssembler,
        host_a: Host,
        host_b: Host,
        wg0: Interface,
    }

    /// Host A (wg0, 10.0.0.2/24) linked to wg1 on host B (203.0.113.5:51820)
    async fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let repos = Repositories::from_store(store.clone());
        let network = Network::new("mesh", "10.0.0.0/24");

        let host_a = Host::new("a", "198.51.100.7");
        let host_b = Host::new("b", "203.0.113.5");
        HostRepository::create(store.as_ref(), &host_a).await.unwrap();
        HostRepository::create(store.as_ref(), &host_b).await.unwrap();

        let wg0 = Interface::new(host_a.id, "wg0")
            .with_network(network.id)
            .with_address("10.0.0.2/24")
            .with_listen_port(51820);
        let wg1 = Interface::new(host_b.id, "wg1")
            .with_network(network.id)
            .with_address("10.0.0.3/24")
            .with_listen_port(51820)
            .with_public_key("peer-public-key");
        InterfaceRepository::create(store.as_ref(), &wg0).await.unwrap();
        InterfaceRepository::create(store.as_ref(), &wg1).await.unwrap();

        let link = Link::new(network.id, wg0.id, wg1.id)
            .with_allowed_ips(["10.0.0.3/32"])
            .with_keepalive(25);
        LinkRepository::create(store.as_ref(), &link).await.unwrap();

        Fixture {
            assembler: SyncAssembler::new(&repos),
            store,
            host_a,
            host_b,
            wg0,
        }
    }

    #[tokio::test]
    async fn test_get_host_settings() {
        let f = fixture().await;
        let settings = f.assembler.get_host_settings(f.host_a.id).await.unwrap();

        assert_eq!(settings.interfaces.len(), 1);
        assert_eq!(settings.interfaces[0].name, "wg0");
        assert_eq!(settings.interfaces[0].address, "10.0.0.2/24");

        assert_eq!(
            settings.peers,
            vec![PeerSettings {
                interface: "wg0".to_string(),
                public_key: "peer-public-key".to_string(),
                address: "203.0.113.5".to_string(),
                port: 51820,
                allowed_ips: vec!["10.0.0.3/32".to_string()],
                persistent_keepalive: 25,
            }]
        );
    }

    #[tokio::test]
    async fn test_get_host_settings_unknown_host() {
        let f = fixture().await;
        assert!(matches!(
            f.assembler.get_host_settings(Uuid::new_v4()).await,
            Err(SyncError::HostNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_pages_accumulate() {
        let f = fixture().await;
        for i in 1..=4 {
            let interface = Interface::new(f.host_a.id, format!("wg{}", i + 10));
            InterfaceRepository::create(f.store.as_ref(), &interface).await.unwrap();
        }

        let assembler = SyncAssembler::new(&Repositories::from_store(f.store.clone())).with_page_size(2);
        let settings = assembler.get_host_settings(f.host_a.id).await.unwrap();
        assert_eq!(settings.interfaces.len(), 5);
        assert_eq!(settings.interfaces[0].name, "wg0");
        assert_eq!(settings.peers.len(), 1);
    }

    #[tokio::test]
    async fn test_dangling_link_skipped() {
        let f = fixture().await;
        let orphan = Link::new(Uuid::new_v4(), f.wg0.id, Uuid::new_v4());
        LinkRepository::create(f.store.as_ref(), &orphan).await.unwrap();

        let settings = f.assembler.get_host_settings(f.host_a.id).await.unwrap();
        assert_eq!(settings.peers.len(), 1);
    }

    #[tokio::test]
    async fn test_update_host_state_merges_public_key() {
        let f = fixture().await;
        let report = HostState {
            interfaces: vec![InterfaceState {
                name: "wg0".to_string(),
                public_key: "fresh-key".to_string(),
            }],
        };

        let accepted = f.assembler.update_host_state(f.host_a.id, &report).await.unwrap();
        assert_eq!(accepted, report);

        let stored = InterfaceRepository::get_by_id(f.store.as_ref(), f.wg0.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.public_key, "fresh-key");
        assert_eq!(stored.ip_address, f.wg0.ip_address);
        assert_eq!(stored.listen_port, f.wg0.listen_port);
    }

    #[tokio::test]
    async fn test_update_host_state_skips_unknown_interface() {
        let f = fixture().await;
        let before = f.assembler.get_host_settings(f.host_a.id).await.unwrap();
        let stored_before = InterfaceRepository::get_by_id(f.store.as_ref(), f.wg0.id)
            .await
            .unwrap();

        let report = HostState {
            interfaces: vec![InterfaceState {
                name: "wg-unknown".to_string(),
                public_key: "whatever".to_string(),
            }],
        };
        let accepted = f.assembler.update_host_state(f.host_a.id, &report).await.unwrap();

        assert!(accepted.interfaces.is_empty());
        assert_eq!(f.assembler.unknown_reports(), 1);
        assert_eq!(f.assembler.get_host_settings(f.host_a.id).await.unwrap(), before);
        assert_eq!(
            InterfaceRepository::get_by_id(f.store.as_ref(), f.wg0.id).await.unwrap(),
            stored_before
        );
    }

    #[tokio::test]
    async fn test_synchronize_host_reflects_report() {
        let f = fixture().await;

        let report = HostState {
            interfaces: vec![InterfaceState {
                name: "wg1".to_string(),
                public_key: "rotated-peer-key".to_string(),
            }],
        };
        f.assembler.synchronize_host(f.host_b.id, &report).await.unwrap();

        // Host A sees host B's new key on its next sync
        let settings = f
            .assembler
            .synchronize_host(f.host_a.id, &HostState::default())
            .await
            .unwrap();
        assert_eq!(settings.peers[0].public_key, "rotated-peer-key");
    }
}
