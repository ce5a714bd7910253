//! Capability interface for applying interface configuration to the host

use crate::config::InterfaceConfig;
use crate::error::Result;
use async_trait::async_trait;

/// Applies interface configuration to the local network stack
///
/// Implementations own device creation, addressing and peer programming. The
/// agent never touches the OS directly, which keeps it testable against a fake.
#[async_trait]
pub trait NetworkInterfaceController: Send + Sync {
    /// Create the interface if needed and converge it to `config`
    ///
    /// The peer list in `config` is authoritative: peers not listed are removed.
    async fn apply_configuration(&self, config: &InterfaceConfig) -> Result<()>;

    /// Tear down an interface that is no longer desired
    async fn remove_interface(&self, name: &str) -> Result<()>;
}
