//! Per-network address pools
//!
//! An [`AddressPool`] tracks which IPv4 addresses of one CIDR range are in use.
//! Pools are a cache: the coordinator rebuilds them from interface records, so
//! nothing here is persisted.

use crate::error::{OverlayError, Result};
use ipnet::Ipv4Net;
use std::collections::HashSet;
use std::net::Ipv4Addr;

/// Address pool for one overlay network
///
/// Assigned addresses are keyed by their 32-bit big-endian integer form.
/// Allocation scans the usable host range in ascending order, so the lowest
/// free address always wins and identical pool state yields identical leases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPool {
    /// Network CIDR range
    network: Ipv4Net,
    /// Assigned addresses as host-order integers
    assigned: HashSet<u32>,
}

impl AddressPool {
    /// Create an empty pool for the given CIDR range
    ///
    /// # Example
    /// ```
    /// use wiremesh_overlay::allocator::AddressPool;
    ///
    /// let pool = AddressPool::new("10.200.0.0/24").unwrap();
    /// assert_eq!(pool.total_hosts(), 254);
    /// ```
    pub fn new(cidr: &str) -> Result<Self> {
        let network: Ipv4Net = cidr
            .trim()
            .parse()
            .map_err(|e| OverlayError::InvalidCidr(format!("{}: {}", cidr, e)))?;

        Ok(Self {
            network: network.trunc(),
            assigned: HashSet::new(),
        })
    }

    /// Lease the lowest unassigned host address
    ///
    /// # Example
    /// ```
    /// use wiremesh_overlay::allocator::AddressPool;
    ///
    /// let mut pool = AddressPool::new("192.168.2.0/24").unwrap();
    /// assert_eq!(pool.allocate().unwrap().to_string(), "192.168.2.1");
    /// assert_eq!(pool.allocate().unwrap().to_string(), "192.168.2.2");
    /// ```
    pub fn allocate(&mut self) -> Result<Ipv4Addr> {
        let (first, last) = self.usable_range();
        for candidate in first..=last {
            if self.assigned.insert(candidate) {
                return Ok(Ipv4Addr::from(candidate));
            }
        }
        Err(OverlayError::NoAddressAvailable(self.network.to_string()))
    }

    /// Assign a specific address
    ///
    /// Fails if the address is not a usable host of the range or is already
    /// assigned.
    pub fn assign(&mut self, ip: Ipv4Addr) -> Result<()> {
        self.check_range(ip)?;
        if !self.assigned.insert(u32::from(ip)) {
            return Err(OverlayError::AlreadyAssigned(ip));
        }
        Ok(())
    }

    /// Mark an address assigned without failing on duplicates (state restore)
    pub fn mark_assigned(&mut self, ip: Ipv4Addr) -> Result<()> {
        self.check_range(ip)?;
        self.assigned.insert(u32::from(ip));
        Ok(())
    }

    /// Release an address back to the pool
    ///
    /// Returns `true` if the address was assigned.
    pub fn release(&mut self, ip: Ipv4Addr) -> bool {
        self.assigned.remove(&u32::from(ip))
    }

    pub fn is_assigned(&self, ip: Ipv4Addr) -> bool {
        self.assigned.contains(&u32::from(ip))
    }

    /// Check if an IP address is within the CIDR range
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        self.network.contains(&ip)
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }

    /// Number of usable host addresses in the range
    pub fn total_hosts(&self) -> u64 {
        let (first, last) = self.usable_range();
        u64::from(last) - u64::from(first) + 1
    }

    pub fn available_count(&self) -> u64 {
        self.total_hosts()
            .saturating_sub(self.assigned.len() as u64)
    }

    pub fn cidr(&self) -> String {
        self.network.to_string()
    }

    pub fn prefix_len(&self) -> u8 {
        self.network.prefix_len()
    }

    /// Assigned addresses in ascending order
    pub fn assigned_addresses(&self) -> Vec<Ipv4Addr> {
        let mut addrs: Vec<u32> = self.assigned.iter().copied().collect();
        addrs.sort_unstable();
        addrs.into_iter().map(Ipv4Addr::from).collect()
    }

    /// Render an address with this pool's prefix length (e.g. "10.0.0.2/24")
    pub fn with_prefix(&self, ip: Ipv4Addr) -> String {
        format!("{}/{}", ip, self.network.prefix_len())
    }

    /// First and last usable address as integers
    ///
    /// /31 and /32 ranges have no network or broadcast address to skip.
    fn usable_range(&self) -> (u32, u32) {
        let network = u32::from(self.network.network());
        let broadcast = u32::from(self.network.broadcast());
        if self.network.prefix_len() >= 31 {
            (network, broadcast)
        } else {
            (network + 1, broadcast - 1)
        }
    }

    /// Same address set [`allocate`](Self::allocate) draws from
    fn check_range(&self, ip: Ipv4Addr) -> Result<()> {
        let (first, last) = self.usable_range();
        if !(first..=last).contains(&u32::from(ip)) {
            return Err(OverlayError::NotWithinRange(ip, self.network.to_string()));
        }
        Ok(())
    }
}

/// Parse an interface address, tolerating a `/prefix` suffix
///
/// # Example
/// ```
/// use wiremesh_overlay::allocator::parse_address;
///
/// assert_eq!(parse_address("10.0.0.2/24").unwrap().to_string(), "10.0.0.2");
/// assert!(parse_address("not-an-ip").is_err());
/// ```
pub fn parse_address(addr: &str) -> Result<Ipv4Addr> {
    let trimmed = addr.trim();
    let host = match trimmed.split_once('/') {
        Some((host, prefix)) => {
            prefix
                .parse::<u8>()
                .ok()
                .filter(|p| *p <= 32)
                .ok_or_else(|| OverlayError::InvalidAddress(addr.to_string()))?;
            host
        }
        None => trimmed,
    };
    host.parse()
        .map_err(|_| OverlayError::InvalidAddress(addr.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_new() {
        let pool = AddressPool::new("10.200.0.0/24").unwrap();
        assert_eq!(pool.cidr(), "10.200.0.0/24");
        assert_eq!(pool.assigned_count(), 0);
    }

    #[test]
    fn test_pool_invalid_cidr() {
        assert!(matches!(
            AddressPool::new("invalid"),
            Err(OverlayError::InvalidCidr(_))
        ));
    }

    #[test]
    fn test_pool_normalizes_host_bits() {
        let pool = AddressPool::new("10.0.0.7/24").unwrap();
        assert_eq!(pool.cidr(), "10.0.0.0/24");
    }

    #[test]
    fn test_allocate_ascending() {
        let mut pool = AddressPool::new("192.168.2.0/24").unwrap();
        let leased: Vec<String> = (0..3)
            .map(|_| pool.allocate().unwrap().to_string())
            .collect();
        assert_eq!(leased, vec!["192.168.2.1", "192.168.2.2", "192.168.2.3"]);
    }

    #[test]
    fn test_allocate_exhaustion() {
        // /30 has 2 usable hosts (excluding network and broadcast)
        let mut pool = AddressPool::new("10.200.0.0/30").unwrap();
        assert_eq!(pool.allocate().unwrap().to_string(), "10.200.0.1");
        assert_eq!(pool.allocate().unwrap().to_string(), "10.200.0.2");
        assert!(matches!(
            pool.allocate(),
            Err(OverlayError::NoAddressAvailable(_))
        ));
    }

    #[test]
    fn test_allocate_unique_and_in_range() {
        let mut pool = AddressPool::new("10.9.0.0/27").unwrap();
        let mut seen = HashSet::new();
        while let Ok(ip) = pool.allocate() {
            assert!(pool.contains(ip));
            assert!(seen.insert(ip), "{} leased twice", ip);
        }
        assert_eq!(seen.len() as u64, pool.total_hosts());
    }

    #[test]
    fn test_allocate_fills_released_gap_first() {
        let mut pool = AddressPool::new("10.0.0.0/24").unwrap();
        let first = pool.allocate().unwrap();
        let _second = pool.allocate().unwrap();
        assert!(pool.release(first));
        assert_eq!(pool.allocate().unwrap(), first);
    }

    #[test]
    fn test_allocate_skips_manually_assigned() {
        let mut pool = AddressPool::new("10.0.0.0/24").unwrap();
        pool.assign("10.0.0.1".parse().unwrap()).unwrap();
        assert_eq!(pool.allocate().unwrap().to_string(), "10.0.0.2");
    }

    #[test]
    fn test_point_to_point_ranges() {
        let mut pool = AddressPool::new("10.0.0.0/31").unwrap();
        assert_eq!(pool.total_hosts(), 2);
        assert_eq!(pool.allocate().unwrap().to_string(), "10.0.0.0");
        assert_eq!(pool.allocate().unwrap().to_string(), "10.0.0.1");

        let mut single = AddressPool::new("10.0.0.9/32").unwrap();
        assert_eq!(single.allocate().unwrap().to_string(), "10.0.0.9");
        assert!(single.allocate().is_err());
    }

    #[test]
    fn test_assign_duplicate() {
        let mut pool = AddressPool::new("10.200.0.0/24").unwrap();
        let ip: Ipv4Addr = "10.200.0.50".parse().unwrap();
        pool.assign(ip).unwrap();
        assert!(pool.is_assigned(ip));
        assert!(matches!(
            pool.assign(ip),
            Err(OverlayError::AlreadyAssigned(addr)) if addr == ip
        ));
    }

    #[test]
    fn test_assign_out_of_range() {
        let mut pool = AddressPool::new("10.200.0.0/24").unwrap();
        assert!(matches!(
            pool.assign("192.168.1.1".parse().unwrap()),
            Err(OverlayError::NotWithinRange(_, _))
        ));
    }

    #[test]
    fn test_assign_rejects_network_and_broadcast() {
        let mut pool = AddressPool::new("10.0.0.0/24").unwrap();
        for ip in ["10.0.0.0", "10.0.0.255"] {
            assert!(matches!(
                pool.assign(ip.parse().unwrap()),
                Err(OverlayError::NotWithinRange(_, _))
            ));
        }
        assert_eq!(pool.assigned_count(), 0);
        pool.assign("10.0.0.254".parse().unwrap()).unwrap();

        let mut p2p = AddressPool::new("10.0.0.0/31").unwrap();
        p2p.assign("10.0.0.0".parse().unwrap()).unwrap();
    }

    #[test]
    fn test_assign_then_release_is_noop() {
        let mut pool = AddressPool::new("10.0.0.0/24").unwrap();
        pool.allocate().unwrap();
        let before = pool.clone();

        let ip: Ipv4Addr = "10.0.0.77".parse().unwrap();
        pool.assign(ip).unwrap();
        assert!(pool.release(ip));
        assert_eq!(pool, before);
    }

    #[test]
    fn test_mark_assigned_is_idempotent() {
        let mut pool = AddressPool::new("10.0.0.0/24").unwrap();
        let ip: Ipv4Addr = "10.0.0.100".parse().unwrap();
        pool.mark_assigned(ip).unwrap();
        pool.mark_assigned(ip).unwrap();
        assert_eq!(pool.assigned_count(), 1);
    }

    #[test]
    fn test_release_unassigned() {
        let mut pool = AddressPool::new("10.0.0.0/24").unwrap();
        assert!(!pool.release("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_counts() {
        let mut pool = AddressPool::new("10.200.0.0/30").unwrap();
        assert_eq!(pool.available_count(), 2);
        pool.allocate().unwrap();
        assert_eq!(pool.available_count(), 1);

        assert_eq!(AddressPool::new("10.0.0.0/8").unwrap().total_hosts(), 16_777_214);
    }

    #[test]
    fn test_assigned_addresses_sorted() {
        let mut pool = AddressPool::new("10.0.0.0/24").unwrap();
        pool.assign("10.0.0.9".parse().unwrap()).unwrap();
        pool.assign("10.0.0.3".parse().unwrap()).unwrap();
        assert_eq!(
            pool.assigned_addresses(),
            vec![
                "10.0.0.3".parse::<Ipv4Addr>().unwrap(),
                "10.0.0.9".parse::<Ipv4Addr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_with_prefix() {
        let pool = AddressPool::new("10.0.0.0/24").unwrap();
        assert_eq!(pool.with_prefix("10.0.0.2".parse().unwrap()), "10.0.0.2/24");
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address(" 10.0.0.2 ").unwrap().to_string(), "10.0.0.2");
        assert_eq!(parse_address("10.0.0.2/24").unwrap().to_string(), "10.0.0.2");
        assert!(parse_address("10.0.0.2/33").is_err());
        assert!(parse_address("10.0.0.256").is_err());
        assert!(parse_address("").is_err());
        assert!(parse_address("fd00::1").is_err());
    }
}
