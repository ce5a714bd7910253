//! API configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::sync::DEFAULT_SYNC_PAGE_SIZE;

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// JWT secret key (should be at least 32 bytes)
    pub jwt_secret: String,

    /// Topology storage backend
    #[serde(default)]
    pub storage: StorageConfig,

    /// How often address pools are rebuilt from the records
    #[serde(default = "default_reconcile_interval", with = "duration_secs")]
    pub reconcile_interval: Duration,

    /// Page size used when assembling host settings
    #[serde(default = "default_sync_page_size")]
    pub sync_page_size: u32,
}

/// Where topology records live
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Records are lost on restart
    #[default]
    Memory,
    /// redb database file
    Redb { path: PathBuf },
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_reconcile_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_sync_page_size() -> u32 {
    DEFAULT_SYNC_PAGE_SIZE
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            jwt_secret: "CHANGE_ME_IN_PRODUCTION".to_string(),
            storage: StorageConfig::default(),
            reconcile_interval: default_reconcile_interval(),
            sync_page_size: default_sync_page_size(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
