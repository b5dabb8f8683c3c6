//! File and folder operations: download into the vault, delete, create folder.

use crate::onedrive::authorized::{ApiCall, AuthorizedClient};
use crate::onedrive::endpoints::ItemLocator;
use crate::onedrive::error::{OneDriveError, OneDriveResult};
use crate::onedrive::transport::HttpRequest;
use crate::onedrive::types::{ConflictBehavior, RemoteItem};
use crate::onedrive::vault::ObjectVault;
use log::{debug, info};
use serde::Serialize;
use serde_json::{json, Value};
use std::path::Path;

/// Result of fetching a remote file into the vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadedFile {
    pub size: u64,
    pub vault_id: String,
    pub file_name: String,
    /// An entry with the same name and size already existed; nothing was added.
    #[serde(skip)]
    pub deduplicated: bool,
}

/// File and folder operations.
pub struct OneDriveFiles<'a> {
    client: &'a mut AuthorizedClient,
}

impl<'a> OneDriveFiles<'a> {
    pub fn new(client: &'a mut AuthorizedClient) -> Self {
        Self { client }
    }

    /// Item metadata.
    pub async fn get_item(&mut self, locator: &ItemLocator) -> OneDriveResult<RemoteItem> {
        let resp = self.client.call(&ApiCall::get(locator.item_endpoint())).await?;
        Ok(serde_json::from_value(resp)?)
    }

    /// Download a file through its pre-authenticated URL into the vault.
    ///
    /// The body is staged in `scratch_dir`; an existing vault entry with the
    /// same name and size is reused instead of adding a second copy.
    pub async fn download_to_vault(
        &mut self,
        locator: &ItemLocator,
        vault: &dyn ObjectVault,
        container_id: &str,
        scratch_dir: &Path,
    ) -> OneDriveResult<DownloadedFile> {
        let item = self.get_item(locator).await?;
        let (Some(file_name), Some(download_url)) = (item.name, item.download_url) else {
            return Err(OneDriveError::not_found(
                "File does not exist or is not a downloadable file",
            ));
        };

        std::fs::create_dir_all(scratch_dir)?;
        let staged = tempfile::Builder::new()
            .prefix("onedrive-download-")
            .tempfile_in(scratch_dir)?;
        let mut sink = tokio::fs::File::from_std(staged.reopen()?);
        let size = self
            .client
            .context()
            .rest
            .download(&HttpRequest::get(download_url), &mut sink)
            .await?;
        drop(sink);

        if size == 0 {
            return Err(OneDriveError::not_found("No data found in the file"));
        }

        if let Some(existing) = vault.find_duplicate(container_id, &file_name, size)? {
            debug!("{} already in vault as {}", file_name, existing.vault_id);
            return Ok(DownloadedFile {
                size: existing.size,
                vault_id: existing.vault_id,
                file_name,
                deduplicated: true,
            });
        }

        let entry = vault.add(staged.path(), container_id, &file_name)?;
        info!("Downloaded {} ({} bytes) into vault", file_name, size);
        Ok(DownloadedFile {
            size: entry.size,
            vault_id: entry.vault_id,
            file_name,
            deduplicated: false,
        })
    }

    pub async fn delete_item(&mut self, locator: &ItemLocator) -> OneDriveResult<Value> {
        let resp = self
            .client
            .call(&ApiCall::delete(locator.item_endpoint()))
            .await?;
        info!("Deleted {}", locator.item_endpoint());
        Ok(resp)
    }

    /// Create `name` under the folder `parent` points at.
    pub async fn create_folder(
        &mut self,
        parent: &ItemLocator,
        name: &str,
        conflict: ConflictBehavior,
    ) -> OneDriveResult<RemoteItem> {
        let name = name.trim();
        if name.is_empty() {
            return Err(OneDriveError::validation("Please provide a folder name"));
        }
        let body = json!({
            "name": name,
            "folder": {},
            "@microsoft.graph.conflictBehavior": conflict.as_str(),
        });
        let resp = self
            .client
            .call(&ApiCall::post_json(parent.children_endpoint(), body))
            .await?;
        let mut item: RemoteItem = serde_json::from_value(resp)?;
        item.normalize();
        info!("Created folder {}", item.name.as_deref().unwrap_or(name));
        Ok(item)
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
