//! Durable storage for the pending-deployment marker.
//!
//! The marker bridges a wallet redirect: it is written right before control is
//! handed to the wallet and consumed exactly once by the success view.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// Key under which the marker is persisted.
pub const PENDING_DEPLOYMENT_KEY: &str = "pendingDeploymentAccountId";

/// File name used by [`FilePendingStore`].
pub const MARKER_FILENAME: &str = "pending-deployment.json";

/// Record written just before a wallet handoff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRedirectMarker {
    #[serde(rename = "pendingDeploymentAccountId")]
    pub target_account_id: String,
}

impl PendingRedirectMarker {
    pub fn new(target_account_id: impl Into<String>) -> Self {
        Self {
            target_account_id: target_account_id.into(),
        }
    }
}

/// Key-value store holding at most one unconsumed marker.
pub trait PendingDeploymentStore: Send + Sync {
    /// Persist `marker`, replacing any previous one.
    fn put(&self, marker: &PendingRedirectMarker) -> Result<(), DeployError>;

    /// Read the marker without consuming it.
    fn get(&self) -> Result<Option<PendingRedirectMarker>, DeployError>;

    /// Erase the marker. Clearing an empty store is a no-op.
    fn clear(&self) -> Result<(), DeployError>;

    /// Read the marker and erase it.
    fn take(&self) -> Result<Option<PendingRedirectMarker>, DeployError> {
        let marker = self.get()?;
        if marker.is_some() {
            self.clear()?;
        }
        Ok(marker)
    }
}

/// In-process store. Does not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    marker: Mutex<Option<PendingRedirectMarker>>,
}

impl MemoryPendingStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Option<PendingRedirectMarker>>, DeployError> {
        self.marker
            .lock()
            .map_err(|_| DeployError::Storage("marker lock poisoned".to_string()))
    }
}

impl PendingDeploymentStore for MemoryPendingStore {
    fn put(&self, marker: &PendingRedirectMarker) -> Result<(), DeployError> {
        *self.slot()? = Some(marker.clone());
        Ok(())
    }

    fn get(&self) -> Result<Option<PendingRedirectMarker>, DeployError> {
        Ok(self.slot()?.clone())
    }

    fn clear(&self) -> Result<(), DeployError> {
        *self.slot()? = None;
        Ok(())
    }

    fn take(&self) -> Result<Option<PendingRedirectMarker>, DeployError> {
        Ok(self.slot()?.take())
    }
}

/// Store backed by a JSON file, locked with an advisory file lock while in use.
#[derive(Debug, Clone)]
pub struct FilePendingStore {
    path: PathBuf,
}

impl FilePendingStore {
    /// Store the marker in `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, DeployError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| {
            DeployError::Storage(format!("Failed to create {}: {}", dir.display(), e))
        })?;

        Ok(Self {
            path: dir.join(MARKER_FILENAME),
        })
    }

    /// Store the marker under the platform data directory.
    pub fn in_data_dir() -> Result<Self, DeployError> {
        let base = dirs::data_local_dir()
            .ok_or_else(|| DeployError::Storage("No local data directory available".to_string()))?;
        Self::new(base.join("nbx"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_locked(&self) -> Result<File, DeployError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.io_error("open", e))?;
        file.lock_exclusive().map_err(|e| self.io_error("lock", e))?;
        Ok(file)
    }

    fn io_error(&self, action: &str, e: std::io::Error) -> DeployError {
        DeployError::Storage(format!("Failed to {} {}: {}", action, self.path.display(), e))
    }
}

impl PendingDeploymentStore for FilePendingStore {
    fn put(&self, marker: &PendingRedirectMarker) -> Result<(), DeployError> {
        let json = serde_json::to_string_pretty(marker)
            .map_err(|e| DeployError::Storage(e.to_string()))?;

        let mut file = self.open_locked()?;
        file.set_len(0).map_err(|e| self.io_error("truncate", e))?;
        file.seek(SeekFrom::Start(0)).map_err(|e| self.io_error("seek", e))?;
        file.write_all(json.as_bytes()).map_err(|e| self.io_error("write", e))?;
        file.sync_all().map_err(|e| self.io_error("sync", e))?;

        tracing::debug!(
            path = %self.path.display(),
            target = %marker.target_account_id,
            "Pending deployment marker saved"
        );
        Ok(())
    }

    fn get(&self) -> Result<Option<PendingRedirectMarker>, DeployError> {
        if !self.path.exists() {
            return Ok(None);
        }

        let mut file = self.open_locked()?;
        let mut content = String::new();
        file.read_to_string(&mut content).map_err(|e| self.io_error("read", e))?;

        if content.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str(&content) {
            Ok(marker) => Ok(Some(marker)),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring unreadable pending deployment marker"
                );
                Ok(None)
            }
        }
    }

    fn clear(&self) -> Result<(), DeployError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error("remove", e)),
        }
    }
}
