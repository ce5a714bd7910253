//! In-memory storage backend, used by tests and ephemeral coordinators

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;
use wiremesh_types::{Host, Interface, Link, Network};

use super::{
    paginate, sort_records, HostRepository, InterfaceRepository, LinkRepository,
    NetworkRepository, Page, PageRequest, StorageError,
};

/// In-memory storage for every topology record
#[derive(Default)]
pub struct InMemoryStore {
    networks: RwLock<HashMap<Uuid, Network>>,
    hosts: RwLock<HashMap<Uuid, Host>>,
    interfaces: RwLock<HashMap<Uuid, Interface>>,
    links: RwLock<HashMap<Uuid, Link>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert_new<T: Clone>(map: &mut HashMap<Uuid, T>, id: Uuid, value: &T) -> Result<(), StorageError> {
    if map.contains_key(&id) {
        return Err(StorageError::Conflict(id.to_string()));
    }
    map.insert(id, value.clone());
    Ok(())
}

#[async_trait]
impl NetworkRepository for InMemoryStore {
    async fn create(&self, network: &Network) -> Result<(), StorageError> {
        insert_new(&mut *self.networks.write().await, network.id, network)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Network>, StorageError> {
        Ok(self.networks.read().await.get(&id).cloned())
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Network>, StorageError> {
        let mut items: Vec<Network> = self.networks.read().await.values().cloned().collect();
        sort_records(&mut items, |n| (n.created_at, n.id));
        Ok(paginate(items, page))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.networks.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl HostRepository for InMemoryStore {
    async fn create(&self, host: &Host) -> Result<(), StorageError> {
        insert_new(&mut *self.hosts.write().await, host.id, host)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Host>, StorageError> {
        Ok(self.hosts.read().await.get(&id).cloned())
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Host>, StorageError> {
        let mut items: Vec<Host> = self.hosts.read().await.values().cloned().collect();
        sort_records(&mut items, |h| (h.created_at, h.id));
        Ok(paginate(items, page))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.hosts.write().await.remove(&id).is_some())
    }
}

impl InMemoryStore {
    async fn interfaces_where(
        &self,
        page: PageRequest,
        filter: impl Fn(&Interface) -> bool,
    ) -> Page<Interface> {
        let mut items: Vec<Interface> = self
            .interfaces
            .read()
            .await
            .values()
            .filter(|i| filter(i))
            .cloned()
            .collect();
        sort_records(&mut items, |i| (i.created_at, i.id));
        paginate(items, page)
    }
}

#[async_trait]
impl InterfaceRepository for InMemoryStore {
    async fn create(&self, interface: &Interface) -> Result<(), StorageError> {
        insert_new(&mut *self.interfaces.write().await, interface.id, interface)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Interface>, StorageError> {
        Ok(self.interfaces.read().await.get(&id).cloned())
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Interface>, StorageError> {
        Ok(self.interfaces_where(page, |_| true).await)
    }

    async fn find_all_by_network_id(
        &self,
        network_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Interface>, StorageError> {
        Ok(self
            .interfaces_where(page, |i| i.network_id == Some(network_id))
            .await)
    }

    async fn find_all_by_host_id(
        &self,
        host_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Interface>, StorageError> {
        Ok(self.interfaces_where(page, |i| i.host_id == host_id).await)
    }

    async fn update(&self, interface: &Interface) -> Result<(), StorageError> {
        let mut interfaces = self.interfaces.write().await;
        match interfaces.get_mut(&interface.id) {
            Some(existing) => {
                *existing = interface.clone();
                Ok(())
            }
            None => Err(StorageError::NotFound(interface.id.to_string())),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.interfaces.write().await.remove(&id).is_some())
    }
}

#[async_trait]
impl LinkRepository for InMemoryStore {
    async fn create(&self, link: &Link) -> Result<(), StorageError> {
        insert_new(&mut *self.links.write().await, link.id, link)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Link>, StorageError> {
        Ok(self.links.read().await.get(&id).cloned())
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Link>, StorageError> {
        let mut items: Vec<Link> = self.links.read().await.values().cloned().collect();
        sort_records(&mut items, |l| (l.created_at, l.id));
        Ok(paginate(items, page))
    }

    async fn find_all_by_source_host_id(
        &self,
        host_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Link>, StorageError> {
        let interfaces = self.interfaces.read().await;
        let mut items: Vec<Link> = self
            .links
            .read()
            .await
            .values()
            .filter(|link| {
                interfaces
                    .get(&link.from_interface_id)
                    .is_some_and(|source| source.host_id == host_id)
            })
            .cloned()
            .collect();
        sort_records(&mut items, |l| (l.created_at, l.id));
        Ok(paginate(items, page))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        Ok(self.links.write().await.remove(&id).is_some())
    }
}
