//! Error types for overlay operations

use std::net::Ipv4Addr;
use thiserror::Error;

/// Errors raised by address pools and interface control
#[derive(Debug, Error)]
pub enum OverlayError {
    /// Invalid CIDR notation
    #[error("Invalid CIDR notation: {0}")]
    InvalidCidr(String),

    /// Address could not be parsed as IPv4
    #[error("Invalid IPv4 address: {0}")]
    InvalidAddress(String),

    /// Every usable address in the range is assigned
    #[error("No available IP addresses in CIDR range {0}")]
    NoAddressAvailable(String),

    /// Address is already marked assigned
    #[error("IP address {0} is already assigned")]
    AlreadyAssigned(Ipv4Addr),

    /// Address outside the pool's range
    #[error("IP address {0} is not within CIDR range {1}")]
    NotWithinRange(Ipv4Addr, String),

    /// Invalid key format
    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    /// Invalid interface name
    #[error("Invalid interface name '{0}'")]
    InvalidInterfaceName(String),

    /// Transport command or UAPI exchange failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for overlay operations
pub type Result<T> = std::result::Result<T, OverlayError>;
