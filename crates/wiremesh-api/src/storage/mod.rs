//! Topology storage traits and implementations
//!
//! Networks, hosts, interfaces and links are the system of record. Every list
//! operation is paginated (`page` is 1-based) and returns items in a stable
//! order, so callers can walk a collection page by page.
//!
//! # Example
//!
//! ```no_run
//! use wiremesh_api::storage::{PageRequest, Repositories};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let repos = Repositories::redb("/var/lib/wiremesh/topology.redb")?;
//! let first = repos.networks.find_all(PageRequest::new(1, 50)).await?;
//! println!("{} networks", first.page_info.total_count);
//! # Ok(())
//! # }
//! ```

mod memory;
mod redb_store;

pub use self::memory::InMemoryStore;
pub use self::redb_store::RedbStore;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;
use wiremesh_types::{Host, Interface, Link, Network};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Record with the same identifier already exists
    #[error("Record already exists: {0}")]
    Conflict(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Which page of a collection to fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u32,
    /// Items per page
    pub per_page: u32,
}

impl PageRequest {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page: page.max(1),
            per_page: per_page.max(1),
        }
    }

    /// The first page with the given size
    pub fn first(per_page: u32) -> Self {
        Self::new(1, per_page)
    }

    /// The page following this one
    pub fn next(self) -> Self {
        Self::new(self.page.saturating_add(1), self.per_page)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, 100)
    }
}

/// Pagination metadata returned with every page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    /// Total number of pages (0 for an empty collection)
    pub page_count: u32,
    pub total_count: u64,
}

impl PageInfo {
    /// Whether a page after this one exists
    pub fn has_next(&self) -> bool {
        self.page < self.page_count
    }
}

/// One page of a collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_info: PageInfo,
}

/// Cut one page out of an already ordered collection
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let request = PageRequest::new(request.page, request.per_page);
    let total_count = items.len() as u64;
    let per_page = u64::from(request.per_page);
    let page_count = u32::try_from(total_count.div_ceil(per_page)).unwrap_or(u32::MAX);

    let skip = usize::try_from(u64::from(request.page - 1) * per_page).unwrap_or(usize::MAX);
    let items = items
        .into_iter()
        .skip(skip)
        .take(request.per_page as usize)
        .collect();

    Page {
        items,
        page_info: PageInfo {
            page: request.page,
            per_page: request.per_page,
            page_count,
            total_count,
        },
    }
}

/// Stable ordering for records: creation time, then identifier
pub(crate) fn sort_records<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> (DateTime<Utc>, Uuid),
{
    items.sort_by_key(key);
}

/// Network records
#[async_trait]
pub trait NetworkRepository: Send + Sync {
    async fn create(&self, network: &Network) -> Result<(), StorageError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Network>, StorageError>;

    async fn find_all(&self, page: PageRequest) -> Result<Page<Network>, StorageError>;

    /// Delete a network, returns true if it existed
    async fn delete(&self, id: Uuid) -> Result<bool, StorageError>;
}

/// Host records
#[async_trait]
pub trait HostRepository: Send + Sync {
    async fn create(&self, host: &Host) -> Result<(), StorageError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Host>, StorageError>;

    async fn find_all(&self, page: PageRequest) -> Result<Page<Host>, StorageError>;

    /// Delete a host, returns true if it existed
    async fn delete(&self, id: Uuid) -> Result<bool, StorageError>;
}

/// Interface records
#[async_trait]
pub trait InterfaceRepository: Send + Sync {
    async fn create(&self, interface: &Interface) -> Result<(), StorageError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Interface>, StorageError>;

    async fn find_all(&self, page: PageRequest) -> Result<Page<Interface>, StorageError>;

    async fn find_all_by_network_id(
        &self,
        network_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Interface>, StorageError>;

    async fn find_all_by_host_id(
        &self,
        host_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Interface>, StorageError>;

    /// Replace an existing record; fails with `NotFound` if it does not exist
    async fn update(&self, interface: &Interface) -> Result<(), StorageError>;

    /// Delete an interface, returns true if it existed
    async fn delete(&self, id: Uuid) -> Result<bool, StorageError>;
}

/// Link records
#[async_trait]
pub trait LinkRepository: Send + Sync {
    async fn create(&self, link: &Link) -> Result<(), StorageError>;

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Link>, StorageError>;

    async fn find_all(&self, page: PageRequest) -> Result<Page<Link>, StorageError>;

    /// Links whose source interface belongs to `host_id`
    async fn find_all_by_source_host_id(
        &self,
        host_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Link>, StorageError>;

    /// Delete a link, returns true if it existed
    async fn delete(&self, id: Uuid) -> Result<bool, StorageError>;
}

/// A backend implementing every repository
pub trait TopologyStore:
    NetworkRepository + HostRepository + InterfaceRepository + LinkRepository + 'static
{
}

impl<T> TopologyStore for T where
    T: NetworkRepository + HostRepository + InterfaceRepository + LinkRepository + 'static
{
}

/// The repository handles shared by the lease service, the assembler and the
/// handlers
#[derive(Clone)]
pub struct Repositories {
    pub networks: Arc<dyn NetworkRepository>,
    pub hosts: Arc<dyn HostRepository>,
    pub interfaces: Arc<dyn InterfaceRepository>,
    pub links: Arc<dyn LinkRepository>,
}

impl Repositories {
    /// Use one store for every repository
    pub fn from_store<S: TopologyStore>(store: Arc<S>) -> Self {
        Self {
            networks: store.clone(),
            hosts: store.clone(),
            interfaces: store.clone(),
            links: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(InMemoryStore::new()))
    }

    /// Open or create a redb database at `path`
    pub fn redb<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Ok(Self::from_store(Arc::new(RedbStore::open(path)?)))
    }
}
