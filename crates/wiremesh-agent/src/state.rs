//! Local persistence of the last settings document

use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use wiremesh_types::HostSettings;

use crate::error::{AgentError, Result};

/// Write `data` to `path` through a temp file in the same directory and a rename
pub(crate) async fn write_atomic(path: &Path, data: &[u8], private: bool) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    let mut file = tokio::fs::File::create(&temp_path).await?;
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await?;
    }
    #[cfg(not(unix))]
    let _ = private;

    file.write_all(data).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temp_path, path).await?;
    Ok(())
}

/// Read a file, `None` when it does not exist
pub(crate) async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// The settings document the agent last committed to applying
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted document
    ///
    /// Returns `None` when nothing was persisted yet and
    /// [`AgentError::CorruptState`] when the file cannot be parsed.
    pub async fn load(&self) -> Result<Option<HostSettings>> {
        let Some(data) = read_optional(&self.path).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&data)
            .map(Some)
            .map_err(|e| AgentError::CorruptState {
                path: self.path.clone(),
                reason: e.to_string(),
            })
    }

    /// Replace the persisted document
    pub async fn save(&self, settings: &HostSettings) -> Result<()> {
        let data = serde_json::to_vec_pretty(settings)?;
        write_atomic(&self.path, &data, false).await?;
        debug!(
            path = %self.path.display(),
            interfaces = settings.interfaces.len(),
            peers = settings.peers.len(),
            "Persisted host settings"
        );
        Ok(())
    }
}
