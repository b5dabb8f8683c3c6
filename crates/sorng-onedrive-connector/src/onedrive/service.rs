//! High-level connector – the single facade a host drives with `Action`s.
//!
//! One connector serves one asset: it owns that asset's token manager,
//! shares the state store with the OAuth callback surface, and writes
//! downloads into the object vault under a container id.

use crate::onedrive::actions::{Action, ActionOutcome};
use crate::onedrive::api_client::RestClient;
use crate::onedrive::auth::{build_authorization_url, TokenManager};
use crate::onedrive::authorized::{AuthorizedClient, ClientContext};
use crate::onedrive::config::ConnectorConfig;
use crate::onedrive::drives::OneDriveDrives;
use crate::onedrive::endpoints::ItemLocator;
use crate::onedrive::error::{OneDriveError, OneDriveErrorKind, OneDriveResult};
use crate::onedrive::files::OneDriveFiles;
use crate::onedrive::state_store::{FileStateStore, StateStore};
use crate::onedrive::tree_walker::TreeWalker;
use crate::onedrive::types::{ConflictBehavior, ConnectorState};
use crate::onedrive::uploads::{ChunkedUploader, FileChunkSource, UploadTarget};
use crate::onedrive::vault::{LocalVault, ObjectVault};
use log::{debug, info};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Connector for one asset.
pub struct OneDriveConnector {
    client: AuthorizedClient,
    store: Arc<dyn StateStore>,
    vault: Arc<dyn ObjectVault>,
    asset_id: String,
    container_id: String,
}

impl OneDriveConnector {
    /// Assemble a connector from explicit parts and load the asset's state.
    pub fn new(
        config: ConnectorConfig,
        rest: RestClient,
        store: Arc<dyn StateStore>,
        vault: Arc<dyn ObjectVault>,
        asset_id: impl Into<String>,
        container_id: impl Into<String>,
    ) -> OneDriveResult<Self> {
        config.validate()?;
        let asset_id = asset_id.into();
        let tokens = TokenManager::new(&config, rest.clone(), store.clone(), asset_id.clone());
        Ok(Self {
            client: AuthorizedClient::new(ClientContext::new(config, rest), tokens),
            store,
            vault,
            asset_id,
            container_id: container_id.into(),
        })
    }

    /// Network transport, state file and vault all under `config.state_dir`.
    pub fn from_config(
        config: ConnectorConfig,
        asset_id: impl Into<String>,
        container_id: impl Into<String>,
    ) -> OneDriveResult<Self> {
        let rest = RestClient::from_config(&config)?;
        let store = Arc::new(FileStateStore::new(config.state_dir.clone()));
        let vault = Arc::new(LocalVault::new(config.state_dir.join("vault")));
        Self::new(config, rest, store, vault, asset_id, container_id)
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn client(&self) -> &AuthorizedClient {
        &self.client
    }

    fn config(&self) -> Arc<ConnectorConfig> {
        self.client.context().config.clone()
    }

    /// Reload the persisted state and tokens.
    pub fn initialize(&mut self) {
        self.client.tokens_mut().reload();
        debug!(
            "Initialized asset {} ({:?})",
            self.asset_id,
            self.client.tokens().status()
        );
    }

    /// Persist the in-memory state.
    pub fn finalize(&self) -> OneDriveResult<()> {
        self.client.tokens().persist()?;
        Ok(())
    }

    /// Run one action to its single terminal outcome.
    pub async fn handle(&mut self, action: Action) -> OneDriveResult<ActionOutcome> {
        info!("Running action {} for asset {}", action.name(), self.asset_id);
        match action {
            Action::TestConnectivity => self.test_connectivity().await,
            Action::ListItems {
                drive_id,
                folder_id,
                folder_path,
            } => {
                self.list_items(drive_id.as_deref(), folder_id.as_deref(), folder_path.as_deref())
                    .await
            }
            Action::ListDrives => self.list_drives().await,
            Action::GetFile {
                drive_id,
                file_id,
                file_path,
            } => {
                let locator = ItemLocator::require_item(
                    drive_id.as_deref(),
                    file_id.as_deref(),
                    file_path.as_deref(),
                    "file",
                )?;
                self.get_file(&locator).await
            }
            Action::UploadFile {
                vault_id,
                file_path,
                drive_id,
                auto_rename,
            } => {
                let target = UploadTarget {
                    drive_id,
                    path: file_path,
                    conflict: ConflictBehavior::from_auto_rename(auto_rename),
                };
                self.upload_file(&vault_id, &target).await
            }
            Action::DeleteFile {
                drive_id,
                file_id,
                file_path,
            } => {
                let locator = ItemLocator::require_item(
                    drive_id.as_deref(),
                    file_id.as_deref(),
                    file_path.as_deref(),
                    "file",
                )?;
                let resp = OneDriveFiles::new(&mut self.client).delete_item(&locator).await?;
                Ok(ActionOutcome::message("File deleted successfully").with_data(vec![resp]))
            }
            Action::DeleteFolder {
                drive_id,
                folder_id,
                folder_path,
            } => {
                let locator = ItemLocator::require_item(
                    drive_id.as_deref(),
                    folder_id.as_deref(),
                    folder_path.as_deref(),
                    "folder",
                )?;
                OneDriveFiles::new(&mut self.client).delete_item(&locator).await?;
                Ok(ActionOutcome::message("Folder deleted successfully"))
            }
            Action::CreateFolder {
                folder_name,
                drive_id,
                folder_id,
                folder_path,
                auto_rename,
            } => {
                let parent = ItemLocator::from_params(
                    drive_id.as_deref(),
                    folder_id.as_deref(),
                    folder_path.as_deref(),
                );
                let item = OneDriveFiles::new(&mut self.client)
                    .create_folder(&parent, &folder_name, ConflictBehavior::from_auto_rename(auto_rename))
                    .await?;
                let created = item.name.clone().unwrap_or(folder_name);
                Ok(
                    ActionOutcome::message(format!("Folder {} created successfully", created))
                        .with_data(vec![serde_json::to_value(item)?]),
                )
            }
        }
    }

    // ─── Handlers ────────────────────────────────────────────────────

    async fn test_connectivity(&mut self) -> OneDriveResult<ActionOutcome> {
        let config = self.config();
        let redirect_uri = config.redirect_uri();
        let authorization_url = build_authorization_url(&config, &redirect_uri, &self.asset_id);

        let tokens = self.client.tokens_mut();
        tokens.replace_state(ConnectorState {
            redirect_uri: Some(redirect_uri.clone()),
            authorization_url: Some(authorization_url),
            ..Default::default()
        });
        tokens.persist()?;

        info!(
            "Open {} in a browser to authorize asset {}",
            config.start_oauth_url(&self.asset_id),
            self.asset_id
        );
        tokio::time::sleep(Duration::from_secs(config.auth_wait_secs)).await;

        let code = self.wait_for_code(&config).await?;
        self.client.tokens_mut().reload();
        self.client
            .tokens_mut()
            .exchange_authorization_code(&code, &redirect_uri)
            .await?;

        let me = OneDriveDrives::new(&mut self.client).me().await?;
        debug!("Signed in as {}", me["userPrincipalName"]);
        Ok(ActionOutcome::message("Test Connectivity Passed"))
    }

    async fn wait_for_code(&self, config: &ConnectorConfig) -> OneDriveResult<String> {
        let interval = Duration::from_secs(config.auth_poll_interval_secs);
        for attempt in 1..=config.auth_poll_attempts {
            if let Some(code) = self.store.load(&self.asset_id).code {
                debug!("Authorization code found after {} checks", attempt);
                return Ok(code);
            }
            if attempt < config.auth_poll_attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(OneDriveError::new(
            OneDriveErrorKind::Timeout,
            "Timeout. Please try again later.",
        ))
    }

    async fn list_items(
        &mut self,
        drive_id: Option<&str>,
        folder_id: Option<&str>,
        folder_path: Option<&str>,
    ) -> OneDriveResult<ActionOutcome> {
        let start = ItemLocator::from_params(drive_id, folder_id, folder_path);
        let listing = TreeWalker::new(&mut self.client)
            .walk(&start.children_endpoint(), start.drive_id.as_deref())
            .await?;
        let total = listing.len();
        let data = listing
            .items
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(ActionOutcome::message(format!("Total items: {}", total))
            .with_summary("total_items", total)
            .with_data(data))
    }

    async fn list_drives(&mut self) -> OneDriveResult<ActionOutcome> {
        let drives = OneDriveDrives::new(&mut self.client).list_my_drives().await?;
        let total = drives.len();
        let data = drives
            .into_iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()?;
        Ok(ActionOutcome::message(format!("Total drives: {}", total))
            .with_summary("total_drives", total)
            .with_data(data))
    }

    async fn get_file(&mut self, locator: &ItemLocator) -> OneDriveResult<ActionOutcome> {
        let scratch = self.config().state_dir.join("downloads");
        let downloaded = OneDriveFiles::new(&mut self.client)
            .download_to_vault(locator, self.vault.as_ref(), &self.container_id, &scratch)
            .await?;
        let message = if downloaded.deduplicated {
            "File already available in the vault"
        } else {
            "File downloaded successfully"
        };
        Ok(ActionOutcome::message(message)
            .with_summary("vault_id", downloaded.vault_id.clone())
            .with_data(vec![serde_json::to_value(&downloaded)?]))
    }

    async fn upload_file(&mut self, vault_id: &str, target: &UploadTarget) -> OneDriveResult<ActionOutcome> {
        let entry = self.vault.get(vault_id)?;
        if !entry.path.is_file() {
            return Err(OneDriveError::new(
                OneDriveErrorKind::VaultError,
                format!("Could not find the file path in the vault for {}", vault_id),
            ));
        }
        let mut source = FileChunkSource::open(&entry.path).await?;
        let item = ChunkedUploader::new(&mut self.client)
            .upload(&mut source, entry.size, target, |p| {
                debug!("Uploaded {}/{} bytes of {}", p.bytes_uploaded, p.file_size, p.file_name)
            })
            .await?;
        Ok(ActionOutcome::message("File uploaded successfully")
            .with_data(vec![serde_json::to_value(item)?]))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onedrive::state_store::MemoryStateStore;
    use crate::onedrive::testing::{file, folder, page, signed_in_state, ASSET};
    use crate::onedrive::transport::ScriptedTransport;
    use serde_json::json;

    fn connector(
        transport: Arc<ScriptedTransport>,
        dir: &std::path::Path,
    ) -> (OneDriveConnector, Arc<MemoryStateStore>) {
        let mut config = ConnectorConfig::new("id", "secret");
        config.state_dir = dir.to_path_buf();
        config.auth_wait_secs = 0;
        config.auth_poll_interval_secs = 0;
        config.auth_poll_attempts = 2;
        let store = Arc::new(MemoryStateStore::new());
        store.save(ASSET, &signed_in_state()).unwrap();
        let vault = Arc::new(LocalVault::new(dir.join("vault")));
        let conn = OneDriveConnector::new(
            config,
            RestClient::new(transport),
            store.clone(),
            vault,
            ASSET,
            "container1",
        )
        .unwrap();
        (conn, store)
    }

    #[tokio::test]
    async fn list_items_reports_total() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new();
        transport
            .push_json(200, page(vec![folder("F", "F"), file("a", "a.txt", 1)], None))
            .await;
        transport.push_json(200, page(vec![file("b", "b.txt", 2)], None)).await;
        let (mut conn, _) = connector(transport.clone(), dir.path());

        let out = conn
            .handle(Action::ListItems {
                drive_id: Some("d1".into()),
                folder_id: None,
                folder_path: Some("/Work/".into()),
            })
            .await
            .unwrap();
        assert_eq!(out.summary["total_items"], json!(3));
        assert_eq!(out.data[1]["name"], "b.txt");
        assert_eq!(out.data[1]["parentReference"]["drivePath"], "/drive/root:");

        let sent = transport.requests().await;
        assert_eq!(
            sent[0].url,
            "https://graph.microsoft.com/v1.0/drives/d1/root:/Work:/children"
        );
        assert_eq!(
            sent[1].url,
            "https://graph.microsoft.com/v1.0/drives/d1/items/F/children"
        );
    }

    #[tokio::test]
    async fn get_file_requires_locator() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new();
        let (mut conn, _) = connector(transport.clone(), dir.path());

        let err = conn
            .handle(Action::GetFile {
                drive_id: None,
                file_id: None,
                file_path: Some("/".into()),
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, OneDriveErrorKind::ValidationError);
        assert_eq!(transport.request_count().await, 0);
    }

    #[tokio::test]
    async fn upload_from_vault() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("payload.bin");
        std::fs::write(&src, b"payload").unwrap();

        let transport = ScriptedTransport::new();
        transport
            .push_json(200, json!({"uploadUrl": "https://up.example/s/1"}))
            .await;
        transport
            .push_json(201, json!({"id": "U1", "name": "payload.bin", "size": 7, "file": {}}))
            .await;
        let (mut conn, _) = connector(transport.clone(), dir.path());
        let entry = conn.vault.add(&src, "container1", "payload.bin").unwrap();

        let out = conn
            .handle(Action::UploadFile {
                vault_id: entry.vault_id,
                file_path: "/Inbox/payload.bin".into(),
                drive_id: None,
                auto_rename: true,
            })
            .await
            .unwrap();
        assert_eq!(out.data[0]["id"], "U1");
        let sent = transport.requests().await;
        assert_eq!(sent[1].header_value("Content-Range"), Some("bytes 0-6/7"));
    }

    #[tokio::test]
    async fn upload_unknown_vault_id() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new();
        let (mut conn, _) = connector(transport, dir.path());
        let err = conn
            .handle(Action::UploadFile {
                vault_id: "missing".into(),
                file_path: "x".into(),
                drive_id: None,
                auto_rename: false,
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind, OneDriveErrorKind::VaultError);
    }

    #[tokio::test]
    async fn connectivity_times_out_without_code() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new();
        let (mut conn, store) = connector(transport.clone(), dir.path());

        let err = conn.handle(Action::TestConnectivity).await.unwrap_err();
        assert_eq!(err.kind, OneDriveErrorKind::Timeout);
        assert_eq!(transport.request_count().await, 0);

        let saved = store.load(ASSET);
        assert!(saved.token.is_none());
        assert_eq!(
            saved.redirect_uri.as_deref(),
            Some("http://localhost:8400/onedrive/result")
        );
        assert!(saved
            .authorization_url
            .unwrap()
            .contains("response_type=code&state=asset1"));
    }

    #[tokio::test]
    async fn finalize_writes_state() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ScriptedTransport::new();
        let (mut conn, store) = connector(transport, dir.path());
        store.save(ASSET, &ConnectorState::default()).unwrap();

        conn.finalize().unwrap();
        assert_eq!(store.load(ASSET).tokens(), signed_in_state().tokens());

        conn.initialize();
        assert_eq!(conn.client().tokens().access_token(), Some("at"));
    }
}
