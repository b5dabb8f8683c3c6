//! Local content-addressed object vault.
//!
//! Downloaded files land here and uploads are read from here. Objects are
//! stored once per SHA-256 digest under `{root}/objects/`; `{root}/index.json`
//! maps vault ids to names and containers.

use crate::onedrive::error::{OneDriveError, OneDriveErrorKind};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("vault I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("vault index is corrupt: {0}")]
    Index(#[from] serde_json::Error),
    #[error("no vault item with id {0}")]
    NotFound(String),
    #[error("vault lock poisoned")]
    Poisoned,
}

impl From<VaultError> for OneDriveError {
    fn from(err: VaultError) -> Self {
        OneDriveError::new(OneDriveErrorKind::VaultError, err.to_string())
    }
}

fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> VaultError + '_ {
    move |source| VaultError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultEntry {
    pub vault_id: String,
    pub name: String,
    pub size: u64,
    pub path: PathBuf,
    pub container_id: String,
    pub created_at: DateTime<Utc>,
}

pub trait ObjectVault: Send + Sync {
    /// Entries attached to `container_id`.
    fn entries(&self, container_id: &str) -> Result<Vec<VaultEntry>, VaultError>;

    /// Copy `source` into the vault under `file_name`.
    fn add(&self, source: &Path, container_id: &str, file_name: &str) -> Result<VaultEntry, VaultError>;

    fn get(&self, vault_id: &str) -> Result<VaultEntry, VaultError>;

    /// Existing entry with the same name and size, if any. Content is not compared.
    fn find_duplicate(
        &self,
        container_id: &str,
        name: &str,
        size: u64,
    ) -> Result<Option<VaultEntry>, VaultError> {
        Ok(self
            .entries(container_id)?
            .into_iter()
            .find(|e| e.name == name && e.size == size))
    }
}

/// Vault rooted in a local directory.
#[derive(Debug)]
pub struct LocalVault {
    root: PathBuf,
    index: Mutex<()>,
}

impl LocalVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            index: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn index_path(&self) -> PathBuf {
        self.root.join("index.json")
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    fn read_index(&self) -> Result<Vec<VaultEntry>, VaultError> {
        let path = self.index_path();
        match fs::read_to_string(&path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(io_at(&path)(e)),
        }
    }

    fn write_index(&self, entries: &[VaultEntry]) -> Result<(), VaultError> {
        let path = self.index_path();
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(entries)?).map_err(io_at(&tmp))?;
        fs::rename(&tmp, &path).map_err(io_at(&path))
    }
}

/// Hex SHA-256 of a file, streamed.
pub fn file_digest(path: &Path) -> Result<(String, u64), VaultError> {
    let mut file = fs::File::open(path).map_err(io_at(path))?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher).map_err(io_at(path))?;
    Ok((hex::encode(hasher.finalize()), size))
}

impl ObjectVault for LocalVault {
    fn entries(&self, container_id: &str) -> Result<Vec<VaultEntry>, VaultError> {
        let _guard = self.index.lock().map_err(|_| VaultError::Poisoned)?;
        Ok(self
            .read_index()?
            .into_iter()
            .filter(|e| e.container_id == container_id)
            .collect())
    }

    fn add(&self, source: &Path, container_id: &str, file_name: &str) -> Result<VaultEntry, VaultError> {
        let (vault_id, size) = file_digest(source)?;
        let _guard = self.index.lock().map_err(|_| VaultError::Poisoned)?;

        let mut index = self.read_index()?;
        if let Some(existing) = index
            .iter()
            .find(|e| e.vault_id == vault_id && e.container_id == container_id && e.name == file_name)
        {
            debug!("Vault already holds {} as {}", file_name, vault_id);
            return Ok(existing.clone());
        }

        let objects = self.objects_dir();
        fs::create_dir_all(&objects).map_err(io_at(&objects))?;
        let object_path = objects.join(&vault_id);
        if !object_path.exists() {
            fs::copy(source, &object_path).map_err(io_at(&object_path))?;
        }

        let entry = VaultEntry {
            vault_id,
            name: file_name.to_string(),
            size,
            path: object_path,
            container_id: container_id.to_string(),
            created_at: Utc::now(),
        };
        index.push(entry.clone());
        self.write_index(&index)?;
        info!("Added {} ({} bytes) to vault as {}", file_name, size, entry.vault_id);
        Ok(entry)
    }

    fn get(&self, vault_id: &str) -> Result<VaultEntry, VaultError> {
        let _guard = self.index.lock().map_err(|_| VaultError::Poisoned)?;
        self.read_index()?
            .into_iter()
            .find(|e| e.vault_id == vault_id)
            .ok_or_else(|| VaultError::NotFound(vault_id.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
