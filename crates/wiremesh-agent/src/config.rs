//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AgentError, Result};

/// File holding the last persisted settings document
pub const SETTINGS_FILE: &str = "settings.json";

/// File holding per-interface private keys
pub const KEYS_FILE: &str = "keys.json";

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Coordinator base URL (e.g. "https://mesh.example.com")
    pub server_url: String,

    /// Host bearer token issued by the coordinator
    pub token: String,

    /// Directory for the settings document and keys
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Time between synchronizations
    #[serde(default = "default_sync_interval", with = "duration_secs")]
    pub sync_interval: Duration,

    /// Timeout for a single coordinator request
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/wiremesh")
}

fn default_sync_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl AgentConfig {
    pub fn new(server_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            token: token.into(),
            data_dir: default_data_dir(),
            sync_interval: default_sync_interval(),
            request_timeout: default_request_timeout(),
        }
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub fn keys_path(&self) -> PathBuf {
        self.data_dir.join(KEYS_FILE)
    }

    /// Reject configurations the agent cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server_url.trim().is_empty() {
            return Err(AgentError::Configuration("server URL is required".into()));
        }
        if !self.server_url.starts_with("http://") && !self.server_url.starts_with("https://") {
            return Err(AgentError::Configuration(format!(
                "server URL must start with http:// or https://, got '{}'",
                self.server_url
            )));
        }
        if self.token.trim().is_empty() {
            return Err(AgentError::Configuration("host token is required".into()));
        }
        if self.sync_interval.is_zero() {
            return Err(AgentError::Configuration(
                "sync interval must be greater than zero".into(),
            ));
        }
        Ok(())
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
