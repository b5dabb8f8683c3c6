//! Connector configuration.
//!
//! Every field has a default; only the application credentials must be
//! supplied. Configs are plain JSON so they can live next to the state file.

use crate::onedrive::error::{OneDriveError, OneDriveResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
pub const DEFAULT_SCOPE: &str = "offline_access files.readwrite.all";

/// Configuration for a connector instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectorConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Azure AD tenant (`common`, `organizations`, `consumers`, or a GUID).
    pub tenant: String,
    pub graph_base_url: String,
    pub login_base_url: String,
    pub scope: String,
    /// Public base URL of the OAuth callback router.
    pub callback_base_url: String,
    /// Directory holding `{asset_id}_state.json`, downloads and the vault.
    pub state_dir: PathBuf,
    pub timeout_sec: u64,
    /// Grace period before the first check for an authorization code.
    pub auth_wait_secs: u64,
    pub auth_poll_interval_secs: u64,
    pub auth_poll_attempts: u32,
    /// Abort a tree walk once it has collected this many items.
    pub walk_max_items: Option<usize>,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            tenant: "common".into(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.into(),
            login_base_url: DEFAULT_LOGIN_BASE_URL.into(),
            scope: DEFAULT_SCOPE.into(),
            callback_base_url: "http://localhost:8400/onedrive".into(),
            state_dir: default_state_dir(),
            timeout_sec: 30,
            auth_wait_secs: 15,
            auth_poll_interval_secs: 3,
            auth_poll_attempts: 35,
            walk_max_items: None,
        }
    }
}

fn default_state_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("sorng")
        .join("onedrive")
}

impl ConnectorConfig {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            ..Default::default()
        }
    }

    /// Load and validate a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> OneDriveResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            OneDriveError::config(format!("Cannot read config {}: {}", path.display(), e))
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            OneDriveError::config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> OneDriveResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(OneDriveError::config("client_id is required"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(OneDriveError::config("client_secret is required"));
        }
        if self.tenant.trim().is_empty() {
            return Err(OneDriveError::config("tenant must not be empty"));
        }
        for (field, value) in [
            ("graph_base_url", &self.graph_base_url),
            ("login_base_url", &self.login_base_url),
            ("callback_base_url", &self.callback_base_url),
        ] {
            url::Url::parse(value)
                .map_err(|e| OneDriveError::config(format!("{} is not a valid URL: {}", field, e)))?;
        }
        if self.timeout_sec == 0 {
            return Err(OneDriveError::config("timeout_sec must be greater than zero"));
        }
        if self.auth_poll_attempts == 0 {
            return Err(OneDriveError::config(
                "auth_poll_attempts must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.login_base_url.trim_end_matches('/'),
            self.tenant
        )
    }

    pub fn authorize_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.login_base_url.trim_end_matches('/'),
            self.tenant
        )
    }

    /// Where the identity platform sends the browser back to.
    pub fn redirect_uri(&self) -> String {
        format!("{}/result", self.callback_base_url.trim_end_matches('/'))
    }

    /// URL the operator opens to begin the consent flow for `asset_id`.
    pub fn start_oauth_url(&self, asset_id: &str) -> String {
        format!(
            "{}/start_oauth?asset_id={}",
            self.callback_base_url.trim_end_matches('/'),
            asset_id
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
