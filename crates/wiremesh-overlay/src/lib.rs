//! WireMesh overlay primitives
//!
//! Address allocation for overlay networks, WireGuard key handling and the
//! controller seam through which agents program local interfaces.
//!
//! # Example
//!
//! ```
//! use wiremesh_overlay::AddressPool;
//!
//! let mut pool = AddressPool::new("10.200.0.0/24").unwrap();
//! assert_eq!(pool.allocate().unwrap().to_string(), "10.200.0.1");
//! ```

pub mod allocator;
pub mod config;
pub mod controller;
pub mod error;
pub mod keys;
pub mod transport;

pub use allocator::{parse_address, AddressPool};
pub use config::{InterfaceConfig, InterfaceHooks, PeerConfig, DEFAULT_WG_PORT};
pub use controller::NetworkInterfaceController;
pub use error::{OverlayError, Result};
pub use keys::{generate_keypair, key_to_hex, public_key_from_private};
pub use transport::WireGuardController;
