//! Per-interface private keys
//!
//! Keys never leave the host; only their public halves are reported.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;
use wiremesh_overlay::{generate_keypair, public_key_from_private};
use wiremesh_types::{HostState, InterfaceState};

use crate::error::{AgentError, Result};
use crate::state::{read_optional, write_atomic};

/// Private keys by interface name, backed by a JSON file
#[derive(Debug)]
pub struct KeyStore {
    path: PathBuf,
    /// name -> (private, public)
    keys: BTreeMap<String, (String, String)>,
}

impl KeyStore {
    /// Load the key file, starting empty when it does not exist
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut keys = BTreeMap::new();

        if let Some(data) = read_optional(&path).await? {
            let stored: BTreeMap<String, String> =
                serde_json::from_slice(&data).map_err(|e| AgentError::CorruptState {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;

            for (name, private_key) in stored {
                let public_key =
                    public_key_from_private(&private_key).map_err(|e| AgentError::CorruptState {
                        path: path.clone(),
                        reason: format!("key for '{}': {}", name, e),
                    })?;
                keys.insert(name, (private_key, public_key));
            }
        }

        Ok(Self { path, keys })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn private_key(&self, interface: &str) -> Option<&str> {
        self.keys.get(interface).map(|(private, _)| private.as_str())
    }

    pub fn public_key(&self, interface: &str) -> Option<&str> {
        self.keys.get(interface).map(|(_, public)| public.as_str())
    }

    /// Private key for `interface`, generating and persisting one on first use
    pub async fn ensure(&mut self, interface: &str) -> Result<String> {
        if let Some(private) = self.private_key(interface) {
            return Ok(private.to_string());
        }

        let (private, public) = generate_keypair();
        self.keys
            .insert(interface.to_string(), (private.clone(), public.clone()));

        if let Err(e) = self.persist().await {
            self.keys.remove(interface);
            return Err(e);
        }

        info!(interface = %interface, public_key = %public, "Generated interface key");
        Ok(private)
    }

    /// Public keys of every interface the host holds a key for
    pub fn report(&self) -> HostState {
        HostState {
            interfaces: self
                .keys
                .iter()
                .map(|(name, (_, public))| InterfaceState {
                    name: name.clone(),
                    public_key: public.clone(),
                })
                .collect(),
        }
    }

    async fn persist(&self) -> Result<()> {
        let stored: BTreeMap<&str, &str> = self
            .keys
            .iter()
            .map(|(name, (private, _))| (name.as_str(), private.as_str()))
            .collect();
        let data = serde_json::to_vec_pretty(&stored)?;
        write_atomic(&self.path, &data, true).await
    }
}
