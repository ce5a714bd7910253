//! IP address leasing for overlay interfaces
//!
//! [`LeaseService`] keeps one [`AddressPool`] per network. The pools are a
//! cache over the interface records: a background task rebuilds them on a
//! fixed interval, so a missed put/pop self-heals within one cycle.
//!
//! A single mutex guards the whole pool collection. Leases, explicit
//! reservations and the rebuild all take it exclusively, which keeps allocation
//! linearizable.
//!
//! The service assumes it is the only allocator for its store. Two
//! coordinators sharing a database would hand out the same addresses.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use wiremesh_overlay::{parse_address, AddressPool, OverlayError};
use wiremesh_types::{Interface, Network};

use crate::storage::{InterfaceRepository, NetworkRepository, PageRequest, StorageError};

/// Default page size used while rebuilding pools
pub const DEFAULT_RECONCILE_PAGE_SIZE: u32 = 100;

/// Lease errors
#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("Network not found: {0}")]
    NetworkNotFound(String),

    #[error("No available IP addresses in network {0}")]
    NoAddressAvailable(String),

    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    #[error("IP address {0} is already assigned")]
    AlreadyAssigned(Ipv4Addr),

    #[error("IP address {0} is not within CIDR range {1}")]
    NotWithinRange(Ipv4Addr, String),

    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    #[error("Address pool for network {0} already exists")]
    AlreadyExists(Uuid),

    #[error("Address pool for network {0} not found")]
    NotFound(Uuid),

    #[error("Lease service already initialized")]
    AlreadyInitialized,

    #[error("Repository error: {0}")]
    Repository(#[from] StorageError),
}

impl From<OverlayError> for LeaseError {
    fn from(err: OverlayError) -> Self {
        match err {
            OverlayError::InvalidCidr(cidr) => LeaseError::InvalidCidr(cidr),
            OverlayError::InvalidAddress(addr) => LeaseError::InvalidAddress(addr),
            OverlayError::NoAddressAvailable(cidr) => LeaseError::NoAddressAvailable(cidr),
            OverlayError::AlreadyAssigned(ip) => LeaseError::AlreadyAssigned(ip),
            OverlayError::NotWithinRange(ip, cidr) => LeaseError::NotWithinRange(ip, cidr),
            other => LeaseError::InvalidAddress(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LeaseError>;

/// Allocation statistics for one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PoolStats {
    pub network_id: Uuid,
    pub cidr: String,
    pub total: u64,
    pub assigned: u64,
    pub available: u64,
    /// Assigned addresses in ascending order
    pub addresses: Vec<String>,
}

/// Owns the address pools of every network
pub struct LeaseService {
    pools: Mutex<HashMap<Uuid, AddressPool>>,
    networks: Arc<dyn NetworkRepository>,
    interfaces: Arc<dyn InterfaceRepository>,
    page_size: u32,
}

impl LeaseService {
    /// Create a service with no pools; call [`reconcile`](Self::reconcile) to
    /// load them from the repositories
    pub fn new(networks: Arc<dyn NetworkRepository>, interfaces: Arc<dyn InterfaceRepository>) -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            networks,
            interfaces,
            page_size: DEFAULT_RECONCILE_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Register a pool for a newly created network
    pub async fn put_network(&self, network: &Network) -> Result<()> {
        let mut pools = self.pools.lock().await;
        if pools.contains_key(&network.id) {
            return Err(LeaseError::AlreadyExists(network.id));
        }
        let pool = AddressPool::new(&network.ip_address_range)?;
        info!(network = %network.id, cidr = %pool.cidr(), "Registered address pool");
        pools.insert(network.id, pool);
        Ok(())
    }

    /// Drop a network's pool
    ///
    /// A missing pool triggers one full reconcile before giving up with
    /// `NotFound`.
    pub async fn pop_network(&self, network: &Network) -> Result<()> {
        if self.pools.lock().await.remove(&network.id).is_some() {
            info!(network = %network.id, "Removed address pool");
            return Ok(());
        }

        debug!(network = %network.id, "Pool missing on pop, reconciling");
        self.reconcile().await?;

        match self.pools.lock().await.remove(&network.id) {
            Some(_) => {
                info!(network = %network.id, "Removed address pool");
                Ok(())
            }
            None => Err(LeaseError::NotFound(network.id)),
        }
    }

    /// Lease the lowest free address of the interface's network
    pub async fn lease(&self, interface: &Interface) -> Result<Ipv4Addr> {
        let network_id = network_of(interface)?;
        let mut pools = self.pools.lock().await;
        let pool = pools
            .get_mut(&network_id)
            .ok_or_else(|| LeaseError::NetworkNotFound(network_id.to_string()))?;

        let ip = pool.allocate()?;
        debug!(network = %network_id, interface = %interface.id, ip = %ip, "Leased address");
        Ok(ip)
    }

    /// Reserve the interface's explicitly set address
    pub async fn put_ip_address(&self, interface: &Interface) -> Result<()> {
        let network_id = network_of(interface)?;
        let ip = explicit_address(interface)?;
        let mut pools = self.pools.lock().await;
        let pool = pools
            .get_mut(&network_id)
            .ok_or_else(|| LeaseError::NetworkNotFound(network_id.to_string()))?;

        pool.assign(ip)?;
        debug!(network = %network_id, interface = %interface.id, ip = %ip, "Reserved address");
        Ok(())
    }

    /// Release the interface's address
    ///
    /// Returns whether the address was assigned; releasing a free address is a
    /// no-op.
    pub async fn pop_ip_address(&self, interface: &Interface) -> Result<bool> {
        let network_id = network_of(interface)?;
        let ip = explicit_address(interface)?;
        let mut pools = self.pools.lock().await;
        let pool = pools
            .get_mut(&network_id)
            .ok_or_else(|| LeaseError::NetworkNotFound(network_id.to_string()))?;

        let released = pool.release(ip);
        debug!(network = %network_id, interface = %interface.id, ip = %ip, released, "Released address");
        Ok(released)
    }

    /// Rebuild every pool from the persisted networks and interfaces
    ///
    /// The lock is held for the whole rebuild. The new pools replace the old
    /// ones only if every page could be read; on error the previous state is
    /// kept.
    pub async fn reconcile(&self) -> Result<()> {
        let mut pools = self.pools.lock().await;
        let mut rebuilt = HashMap::new();
        let mut addresses = 0usize;

        let mut request = PageRequest::first(self.page_size);
        loop {
            let page = self.networks.find_all(request).await?;
            for network in &page.items {
                let mut pool = match AddressPool::new(&network.ip_address_range) {
                    Ok(pool) => pool,
                    Err(e) => {
                        warn!(network = %network.id, error = %e, "Skipping network with invalid range");
                        continue;
                    }
                };
                addresses += self.load_assigned(network, &mut pool).await?;
                rebuilt.insert(network.id, pool);
            }
            if !page.page_info.has_next() {
                break;
            }
            request = request.next();
        }

        info!(networks = rebuilt.len(), addresses, "Rebuilt address pools");
        *pools = rebuilt;
        Ok(())
    }

    async fn load_assigned(&self, network: &Network, pool: &mut AddressPool) -> Result<usize> {
        let mut count = 0;
        let mut request = PageRequest::first(self.page_size);
        loop {
            let page = self
                .interfaces
                .find_all_by_network_id(network.id, request)
                .await?;
            for interface in &page.items {
                let Some(addr) = interface.assigned_address() else {
                    continue;
                };
                match parse_address(addr).map_err(LeaseError::from).and_then(|ip| {
                    pool.mark_assigned(ip)?;
                    Ok(ip)
                }) {
                    Ok(_) => count += 1,
                    Err(e) => warn!(
                        network = %network.id,
                        interface = %interface.id,
                        address = %addr,
                        error = %e,
                        "Skipping unusable interface address"
                    ),
                }
            }
            if !page.page_info.has_next() {
                break;
            }
            request = request.next();
        }
        Ok(count)
    }

    /// Reconcile every `interval` until `shutdown` is notified
    ///
    /// The first rebuild happens one interval after the call; run
    /// [`reconcile`](Self::reconcile) directly at startup. Failures are logged
    /// and the previous pools stay in place.
    pub async fn run_reconcile_loop(self: Arc<Self>, interval: Duration, shutdown: Arc<Notify>) {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!(error = %e, "Address pool reconcile failed, keeping previous pools");
                    }
                }
                _ = shutdown.notified() => {
                    info!("Address pool reconcile loop stopped");
                    return;
                }
            }
        }
    }

    /// Allocation statistics for a network's pool
    pub async fn stats(&self, network_id: Uuid) -> Result<PoolStats> {
        let pools = self.pools.lock().await;
        let pool = pools
            .get(&network_id)
            .ok_or_else(|| LeaseError::NetworkNotFound(network_id.to_string()))?;

        Ok(PoolStats {
            network_id,
            cidr: pool.cidr(),
            total: pool.total_hosts(),
            assigned: pool.assigned_count() as u64,
            available: pool.available_count(),
            addresses: pool
                .assigned_addresses()
                .into_iter()
                .map(|ip| ip.to_string())
                .collect(),
        })
    }

    /// Render a leased address with its network's prefix length
    pub async fn format_address(&self, network_id: Uuid, ip: Ipv4Addr) -> Result<String> {
        let pools = self.pools.lock().await;
        let pool = pools
            .get(&network_id)
            .ok_or_else(|| LeaseError::NetworkNotFound(network_id.to_string()))?;
        Ok(pool.with_prefix(ip))
    }
}

fn network_of(interface: &Interface) -> Result<Uuid> {
    interface.network_id.ok_or_else(|| {
        LeaseError::NetworkNotFound(format!("interface {} has no network", interface.id))
    })
}

fn explicit_address(interface: &Interface) -> Result<Ipv4Addr> {
    let addr = interface
        .assigned_address()
        .ok_or_else(|| LeaseError::InvalidAddress(String::new()))?;
    Ok(parse_address(addr)?)
}

// ---------------------------------------------------------------------------
// Process-wide instance
// ---------------------------------------------------------------------------

static GLOBAL: OnceLock<Arc<LeaseService>> = OnceLock::new();

/// Install the process-wide lease service
///
/// Succeeds exactly once per process.
pub fn init_global(service: Arc<LeaseService>) -> Result<Arc<LeaseService>> {
    GLOBAL
        .set(service.clone())
        .map_err(|_| LeaseError::AlreadyInitialized)?;
    Ok(service)
}

/// The process-wide lease service, if [`init_global`] has run
pub fn global() -> Option<Arc<LeaseService>> {
    GLOBAL.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use std::collections::HashSet;

    async fn service_with(network: &Network) -> (Arc<InMemoryStore>, LeaseService) {
        let store = Arc::new(InMemoryStore::new());
        NetworkRepository::create(store.as_ref(), network).await.unwrap();
        let service = LeaseService::new(store.clone(), store.clone());
        service.put_network(network).await.unwrap();
        (store, service)
    }

    #[tokio::test]
    async fn test_lease_ascending() {
        let network = Network::new("mesh", "192.168.2.0/24");
        let (_, service) = service_with(&network).await;
        let interface = Interface::new(Uuid::new_v4(), "wg0").with_network(network.id);

        let mut leased = Vec::new();
        for _ in 0..3 {
            leased.push(service.lease(&interface).await.unwrap().to_string());
        }
        assert_eq!(leased, vec!["192.168.2.1", "192.168.2.2", "192.168.2.3"]);
    }

    #[tokio::test]
    async fn test_lease_exhaustion() {
        let network = Network::new("tiny", "10.1.0.0/29");
        let (_, service) = service_with(&network).await;
        let interface = Interface::new(Uuid::new_v4(), "wg0").with_network(network.id);

        let mut seen = HashSet::new();
        for _ in 0..6 {
            assert!(seen.insert(service.lease(&interface).await.unwrap()));
        }
        assert!(matches!(
            service.lease(&interface).await,
            Err(LeaseError::NoAddressAvailable(_))
        ));
    }

    #[tokio::test]
    async fn test_lease_unknown_network() {
        let network = Network::new("mesh", "10.0.0.0/24");
        let (_, service) = service_with(&network).await;

        let stray = Interface::new(Uuid::new_v4(), "wg0").with_network(Uuid::new_v4());
        assert!(matches!(
            service.lease(&stray).await,
            Err(LeaseError::NetworkNotFound(_))
        ));

        let unbound = Interface::new(Uuid::new_v4(), "wg0");
        assert!(matches!(
            service.lease(&unbound).await,
            Err(LeaseError::NetworkNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_network_twice() {
        let network = Network::new("mesh", "10.0.0.0/24");
        let (_, service) = service_with(&network).await;
        assert!(matches!(
            service.put_network(&network).await,
            Err(LeaseError::AlreadyExists(id)) if id == network.id
        ));
    }

    #[tokio::test]
    async fn test_put_network_invalid_cidr() {
        let store = Arc::new(InMemoryStore::new());
        let service = LeaseService::new(store.clone(), store);
        assert!(matches!(
            service.put_network(&Network::new("bad", "10.0.0.0/40")).await,
            Err(LeaseError::InvalidCidr(_))
        ));
    }

    #[tokio::test]
    async fn test_put_and_pop_ip_address() {
        let network = Network::new("mesh", "10.0.0.0/24");
        let (_, service) = service_with(&network).await;
        let before = service.stats(network.id).await.unwrap();

        let interface = Interface::new(Uuid::new_v4(), "wg0")
            .with_network(network.id)
            .with_address("10.0.0.50/24");
        service.put_ip_address(&interface).await.unwrap();
        assert!(matches!(
            service.put_ip_address(&interface).await,
            Err(LeaseError::AlreadyAssigned(_))
        ));

        assert!(service.pop_ip_address(&interface).await.unwrap());
        assert!(!service.pop_ip_address(&interface).await.unwrap());
        assert_eq!(service.stats(network.id).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_put_ip_address_validation() {
        let network = Network::new("mesh", "10.0.0.0/24");
        let (_, service) = service_with(&network).await;

        let garbage = Interface::new(Uuid::new_v4(), "wg0")
            .with_network(network.id)
            .with_address("not-an-ip");
        assert!(matches!(
            service.put_ip_address(&garbage).await,
            Err(LeaseError::InvalidAddress(_))
        ));
        assert!(matches!(
            service.pop_ip_address(&garbage).await,
            Err(LeaseError::InvalidAddress(_))
        ));

        let outside = Interface::new(Uuid::new_v4(), "wg0")
            .with_network(network.id)
            .with_address("192.168.0.1");
        assert!(matches!(
            service.put_ip_address(&outside).await,
            Err(LeaseError::NotWithinRange(_, _))
        ));
    }

    #[tokio::test]
    async fn test_reconcile_matches_repository() {
        let network = Network::new("mesh", "10.0.0.0/24");
        let (store, service) = service_with(&network).await;
        let host = Uuid::new_v4();

        for (name, addr) in [("wg0", "10.0.0.2/24"), ("wg1", "10.0.0.7/24"), ("wg2", "")] {
            let interface = Interface::new(host, name)
                .with_network(network.id)
                .with_address(addr);
            InterfaceRepository::create(store.as_ref(), &interface).await.unwrap();
        }

        // An address leased but never persisted is dropped by the rebuild
        let ghost = Interface::new(host, "ghost").with_network(network.id);
        service.lease(&ghost).await.unwrap();

        service.reconcile().await.unwrap();
        let stats = service.stats(network.id).await.unwrap();
        assert_eq!(stats.addresses, vec!["10.0.0.2", "10.0.0.7"]);

        service.reconcile().await.unwrap();
        assert_eq!(service.stats(network.id).await.unwrap(), stats);
    }

    #[tokio::test]
    async fn test_reconcile_paginates_networks() {
        let store = Arc::new(InMemoryStore::new());
        let service = LeaseService::new(store.clone(), store.clone()).with_page_size(2);

        let mut ids = Vec::new();
        for i in 0..5 {
            let network = Network::new(format!("net-{i}"), format!("10.{i}.0.0/24"));
            NetworkRepository::create(store.as_ref(), &network).await.unwrap();
            for j in 0..3 {
                let interface = Interface::new(Uuid::new_v4(), format!("wg{j}"))
                    .with_network(network.id)
                    .with_address(format!("10.{i}.0.{}/24", j + 10));
                InterfaceRepository::create(store.as_ref(), &interface).await.unwrap();
            }
            ids.push(network.id);
        }

        service.reconcile().await.unwrap();
        for id in ids {
            assert_eq!(service.stats(id).await.unwrap().assigned, 3);
        }
    }

    /// Network repository that fails every page after the first once armed
    struct FlakyNetworks {
        inner: Arc<InMemoryStore>,
        armed: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl NetworkRepository for FlakyNetworks {
        async fn create(&self, network: &Network) -> std::result::Result<(), StorageError> {
            NetworkRepository::create(self.inner.as_ref(), network).await
        }

        async fn get_by_id(&self, id: Uuid) -> std::result::Result<Option<Network>, StorageError> {
            NetworkRepository::get_by_id(self.inner.as_ref(), id).await
        }

        async fn find_all(
            &self,
            page: PageRequest,
        ) -> std::result::Result<crate::storage::Page<Network>, StorageError> {
            if page.page > 1 && self.armed.load(std::sync::atomic::Ordering::SeqCst) {
                return Err(StorageError::Database("connection reset".into()));
            }
            NetworkRepository::find_all(self.inner.as_ref(), page).await
        }

        async fn delete(&self, id: Uuid) -> std::result::Result<bool, StorageError> {
            NetworkRepository::delete(self.inner.as_ref(), id).await
        }
    }

    #[tokio::test]
    async fn test_failed_reconcile_keeps_previous_pools() {
        let store = Arc::new(InMemoryStore::new());
        let networks = Arc::new(FlakyNetworks {
            inner: store.clone(),
            armed: std::sync::atomic::AtomicBool::new(false),
        });
        let first = Network::new("a", "10.0.0.0/24");
        let second = Network::new("b", "10.1.0.0/24");
        networks.create(&first).await.unwrap();
        networks.create(&second).await.unwrap();

        let service = LeaseService::new(networks.clone(), store.clone()).with_page_size(1);
        service.reconcile().await.unwrap();

        // Not on record, so a successful rebuild would drop it
        let interface = Interface::new(Uuid::new_v4(), "wg0").with_network(first.id);
        service.lease(&interface).await.unwrap();
        let before = service.stats(first.id).await.unwrap();
        assert_eq!(before.addresses, vec!["10.0.0.1"]);

        networks.armed.store(true, std::sync::atomic::Ordering::SeqCst);
        assert!(matches!(
            service.reconcile().await,
            Err(LeaseError::Repository(StorageError::Database(_)))
        ));
        assert_eq!(service.stats(first.id).await.unwrap(), before);
        assert!(service.stats(second.id).await.is_ok());

        networks.armed.store(false, std::sync::atomic::Ordering::SeqCst);
        service.reconcile().await.unwrap();
        assert!(service.stats(first.id).await.unwrap().addresses.is_empty());
    }

    #[tokio::test]
    async fn test_pop_network_reconciles_missing_pool() {
        let store = Arc::new(InMemoryStore::new());
        let network = Network::new("mesh", "10.0.0.0/24");
        NetworkRepository::create(store.as_ref(), &network).await.unwrap();
        let service = LeaseService::new(store.clone(), store.clone());

        // Pool not registered yet, but the network is on record
        service.pop_network(&network).await.unwrap();

        let unknown = Network::new("gone", "10.9.0.0/24");
        assert!(matches!(
            service.pop_network(&unknown).await,
            Err(LeaseError::NotFound(id)) if id == unknown.id
        ));
    }

    #[tokio::test]
    async fn test_reconcile_loop_stops_on_shutdown() {
        let network = Network::new("mesh", "10.0.0.0/24");
        let (_, service) = service_with(&network).await;
        let shutdown = Arc::new(Notify::new());

        let handle = tokio::spawn(
            Arc::new(service).run_reconcile_loop(Duration::from_millis(10), shutdown.clone()),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        shutdown.notify_one();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
