//! redb-backed persistent storage
//!
//! One table per record type, keyed by the record's UUID string with the JSON
//! encoded record as value.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;
use wiremesh_types::{Host, Interface, Link, Network};

use super::{
    paginate, sort_records, HostRepository, InterfaceRepository, LinkRepository,
    NetworkRepository, Page, PageRequest, StorageError,
};

const NETWORKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("networks");
const HOSTS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("hosts");
const INTERFACES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("interfaces");
const LINKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("links");

type Table = TableDefinition<'static, &'static str, &'static [u8]>;

impl From<redb::Error> for StorageError {
    fn from(err: redb::Error) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::DatabaseError> for StorageError {
    fn from(err: redb::DatabaseError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::TableError> for StorageError {
    fn from(err: redb::TableError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::TransactionError> for StorageError {
    fn from(err: redb::TransactionError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::CommitError> for StorageError {
    fn from(err: redb::CommitError) -> Self {
        StorageError::Database(err.to_string())
    }
}

impl From<redb::StorageError> for StorageError {
    fn from(err: redb::StorageError) -> Self {
        StorageError::Database(err.to_string())
    }
}

/// Persistent storage for every topology record
pub struct RedbStore {
    db: Database,
}

impl RedbStore {
    /// Open or create a redb database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::init(Database::create(path)?)
    }

    /// Create an in-memory redb database (useful for testing)
    pub fn in_memory() -> Result<Self, StorageError> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> Result<Self, StorageError> {
        let write_txn = db.begin_write()?;
        for table in [NETWORKS_TABLE, HOSTS_TABLE, INTERFACES_TABLE, LINKS_TABLE] {
            write_txn.open_table(table)?;
        }
        write_txn.commit()?;
        Ok(Self { db })
    }

    fn insert_new<T: Serialize>(&self, table: Table, id: Uuid, record: &T) -> Result<(), StorageError> {
        let key = id.to_string();
        let data = serde_json::to_vec(record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            if table.get(key.as_str())?.is_some() {
                return Err(StorageError::Conflict(key));
            }
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn replace<T: Serialize>(&self, table: Table, id: Uuid, record: &T) -> Result<(), StorageError> {
        let key = id.to_string();
        let data = serde_json::to_vec(record)?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(table)?;
            if table.get(key.as_str())?.is_none() {
                return Err(StorageError::NotFound(key));
            }
            table.insert(key.as_str(), data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, table: Table, id: Uuid) -> Result<Option<T>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;
        let key = id.to_string();

        match table.get(key.as_str())? {
            Some(data) => Ok(Some(serde_json::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    fn load_all<T: DeserializeOwned>(&self, table: Table) -> Result<Vec<T>, StorageError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(table)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(value.value())?);
        }
        Ok(records)
    }

    fn remove(&self, table: Table, id: Uuid) -> Result<bool, StorageError> {
        let key = id.to_string();
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut table = write_txn.open_table(table)?;
            let removed = table.remove(key.as_str())?;
            removed.is_some()
        };
        write_txn.commit()?;
        Ok(existed)
    }

    fn interfaces_where(
        &self,
        page: PageRequest,
        filter: impl Fn(&Interface) -> bool,
    ) -> Result<Page<Interface>, StorageError> {
        let mut items: Vec<Interface> = self
            .load_all::<Interface>(INTERFACES_TABLE)?
            .into_iter()
            .filter(|i| filter(i))
            .collect();
        sort_records(&mut items, |i| (i.created_at, i.id));
        Ok(paginate(items, page))
    }
}

#[async_trait]
impl NetworkRepository for RedbStore {
    async fn create(&self, network: &Network) -> Result<(), StorageError> {
        self.insert_new(NETWORKS_TABLE, network.id, network)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Network>, StorageError> {
        self.get(NETWORKS_TABLE, id)
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Network>, StorageError> {
        let mut items: Vec<Network> = self.load_all(NETWORKS_TABLE)?;
        sort_records(&mut items, |n| (n.created_at, n.id));
        Ok(paginate(items, page))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        self.remove(NETWORKS_TABLE, id)
    }
}

#[async_trait]
impl HostRepository for RedbStore {
    async fn create(&self, host: &Host) -> Result<(), StorageError> {
        self.insert_new(HOSTS_TABLE, host.id, host)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Host>, StorageError> {
        self.get(HOSTS_TABLE, id)
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Host>, StorageError> {
        let mut items: Vec<Host> = self.load_all(HOSTS_TABLE)?;
        sort_records(&mut items, |h| (h.created_at, h.id));
        Ok(paginate(items, page))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        self.remove(HOSTS_TABLE, id)
    }
}

#[async_trait]
impl InterfaceRepository for RedbStore {
    async fn create(&self, interface: &Interface) -> Result<(), StorageError> {
        self.insert_new(INTERFACES_TABLE, interface.id, interface)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Interface>, StorageError> {
        self.get(INTERFACES_TABLE, id)
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Interface>, StorageError> {
        self.interfaces_where(page, |_| true)
    }

    async fn find_all_by_network_id(
        &self,
        network_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Interface>, StorageError> {
        self.interfaces_where(page, |i| i.network_id == Some(network_id))
    }

    async fn find_all_by_host_id(
        &self,
        host_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Interface>, StorageError> {
        self.interfaces_where(page, |i| i.host_id == host_id)
    }

    async fn update(&self, interface: &Interface) -> Result<(), StorageError> {
        self.replace(INTERFACES_TABLE, interface.id, interface)
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        self.remove(INTERFACES_TABLE, id)
    }
}

#[async_trait]
impl LinkRepository for RedbStore {
    async fn create(&self, link: &Link) -> Result<(), StorageError> {
        self.insert_new(LINKS_TABLE, link.id, link)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Link>, StorageError> {
        self.get(LINKS_TABLE, id)
    }

    async fn find_all(&self, page: PageRequest) -> Result<Page<Link>, StorageError> {
        let mut items: Vec<Link> = self.load_all(LINKS_TABLE)?;
        sort_records(&mut items, |l| (l.created_at, l.id));
        Ok(paginate(items, page))
    }

    async fn find_all_by_source_host_id(
        &self,
        host_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Link>, StorageError> {
        let owners: HashMap<Uuid, Uuid> = self
            .load_all::<Interface>(INTERFACES_TABLE)?
            .into_iter()
            .map(|i| (i.id, i.host_id))
            .collect();

        let mut items: Vec<Link> = self
            .load_all::<Link>(LINKS_TABLE)?
            .into_iter()
            .filter(|link| owners.get(&link.from_interface_id) == Some(&host_id))
            .collect();
        sort_records(&mut items, |l| (l.created_at, l.id));
        Ok(paginate(items, page))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StorageError> {
        self.remove(LINKS_TABLE, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_network_roundtrip() {
        let store = RedbStore::in_memory().unwrap();
        let network = Network::new("mesh", "10.0.0.0/24");

        NetworkRepository::create(&store, &network).await.unwrap();
        let loaded = NetworkRepository::get_by_id(&store, network.id).await.unwrap();
        assert_eq!(loaded, Some(network.clone()));

        assert!(NetworkRepository::delete(&store, network.id).await.unwrap());
        assert!(!NetworkRepository::delete(&store, network.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("topology.redb");
        let host = Host::new("edge-1", "203.0.113.9");
        let interface = Interface::new(host.id, "wg0").with_address("10.0.0.2/24");

        {
            let store = RedbStore::open(&path).unwrap();
            HostRepository::create(&store, &host).await.unwrap();
            InterfaceRepository::create(&store, &interface).await.unwrap();
        }

        let store = RedbStore::open(&path).unwrap();
        let page = store
            .find_all_by_host_id(host.id, PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items, vec![interface]);
    }

    #[tokio::test]
    async fn test_update_replaces_record() {
        let store = RedbStore::in_memory().unwrap();
        let mut interface = Interface::new(Uuid::new_v4(), "wg0");
        assert!(matches!(
            store.update(&interface).await,
            Err(StorageError::NotFound(_))
        ));

        InterfaceRepository::create(&store, &interface).await.unwrap();
        interface.public_key = "pubkey".to_string();
        store.update(&interface).await.unwrap();

        let loaded = InterfaceRepository::get_by_id(&store, interface.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded.public_key, "pubkey");
    }

    #[tokio::test]
    async fn test_links_by_source_host() {
        let store = RedbStore::in_memory().unwrap();
        let host_a = Uuid::new_v4();
        let host_b = Uuid::new_v4();
        let a0 = Interface::new(host_a, "wg0");
        let b0 = Interface::new(host_b, "wg0");
        InterfaceRepository::create(&store, &a0).await.unwrap();
        InterfaceRepository::create(&store, &b0).await.unwrap();

        let network_id = Uuid::new_v4();
        let forward = Link::new(network_id, a0.id, b0.id);
        LinkRepository::create(&store, &forward).await.unwrap();
        LinkRepository::create(&store, &Link::new(network_id, b0.id, a0.id))
            .await
            .unwrap();

        let page = store
            .find_all_by_source_host_id(host_a, PageRequest::first(10))
            .await
            .unwrap();
        assert_eq!(page.items, vec![forward]);
    }
}
