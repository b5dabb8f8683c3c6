//! Per-asset connector state persistence.
//!
//! `load` never fails: a missing or unreadable state file yields an empty
//! state. `save` is best-effort and reports why it failed so callers that
//! depend on the write (token persistence) can verify it.

use crate::onedrive::error::{OneDriveError, OneDriveErrorKind};
use crate::onedrive::types::ConnectorState;
use log::{debug, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    #[error("invalid asset id {0:?}: only ASCII letters and digits are allowed")]
    InvalidAssetId(String),
    #[error("state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("state store lock poisoned")]
    Poisoned,
}

impl From<StateStoreError> for OneDriveError {
    fn from(err: StateStoreError) -> Self {
        OneDriveError::new(OneDriveErrorKind::StateIntegrity, err.to_string())
    }
}

/// Key/value persistence for `ConnectorState`, keyed by asset id.
pub trait StateStore: Send + Sync {
    fn load(&self, asset_id: &str) -> ConnectorState;
    fn save(&self, asset_id: &str, state: &ConnectorState) -> Result<(), StateStoreError>;
}

fn check_asset_id(asset_id: &str) -> Result<(), StateStoreError> {
    if asset_id.is_empty() || !asset_id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(StateStoreError::InvalidAssetId(asset_id.to_string()));
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  File store
// ═══════════════════════════════════════════════════════════════════════

/// Stores each asset's state as `{dir}/{asset_id}_state.json`.
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, asset_id: &str) -> Result<PathBuf, StateStoreError> {
        check_asset_id(asset_id)?;
        Ok(self.dir.join(format!("{}_state.json", asset_id)))
    }

    fn try_load(&self, asset_id: &str) -> Result<ConnectorState, StateStoreError> {
        let path = self.path_for(asset_id)?;
        let text = std::fs::read_to_string(&path).map_err(|source| StateStoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl StateStore for FileStateStore {
    fn load(&self, asset_id: &str) -> ConnectorState {
        match self.try_load(asset_id) {
            Ok(state) => state,
            Err(StateStoreError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                debug!("No state file yet for asset {}", asset_id);
                ConnectorState::default()
            }
            Err(e) => {
                warn!("Could not load state for asset {}: {}", asset_id, e);
                ConnectorState::default()
            }
        }
    }

    fn save(&self, asset_id: &str, state: &ConnectorState) -> Result<(), StateStoreError> {
        let path = self.path_for(asset_id)?;
        let io_err = |source: std::io::Error| StateStoreError::Io {
            path: path.clone(),
            source,
        };
        std::fs::create_dir_all(&self.dir).map_err(|source| StateStoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let text = serde_json::to_string_pretty(state)?;
        // Atomic replace.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)?;
        debug!("Saved state for asset {}", asset_id);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Memory store
// ═══════════════════════════════════════════════════════════════════════

/// In-process store, for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    states: Mutex<HashMap<String, ConnectorState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self, asset_id: &str) -> ConnectorState {
        match self.states.lock() {
            Ok(states) => states.get(asset_id).cloned().unwrap_or_default(),
            Err(_) => {
                warn!("State store lock poisoned while loading {}", asset_id);
                ConnectorState::default()
            }
        }
    }

    fn save(&self, asset_id: &str, state: &ConnectorState) -> Result<(), StateStoreError> {
        check_asset_id(asset_id)?;
        let mut states = self.states.lock().map_err(|_| StateStoreError::Poisoned)?;
        states.insert(asset_id.to_string(), state.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
