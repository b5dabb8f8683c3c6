//! Wire and state types for the OneDrive connector.
//!
//! Graph resources keep every field the server sent: the fields the
//! connector reasons about are typed, everything else rides along in a
//! flattened `extra` map so action output carries the full server record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Marker separating the drive part from the folder part of a Graph path
/// (`/drives/{id}/root:/Documents/Reports`).
pub const ROOT_PATH_MARKER: &str = "root:";

// ═══════════════════════════════════════════════════════════════════════
//  Tokens & persisted state
// ═══════════════════════════════════════════════════════════════════════

/// Token endpoint response, stored verbatim in the state file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default)]
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obtained_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The pair of credentials the connector actually uses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl From<&TokenRecord> for TokenPair {
    fn from(record: &TokenRecord) -> Self {
        Self {
            access_token: Some(record.access_token.clone()).filter(|t| !t.is_empty()),
            refresh_token: record.refresh_token.clone(),
        }
    }
}

/// Everything persisted per asset between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectorState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<TokenRecord>,
    /// Authorization code dropped off by the OAuth callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ConnectorState {
    pub fn tokens(&self) -> TokenPair {
        self.token.as_ref().map(TokenPair::from).unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Drive items
// ═══════════════════════════════════════════════════════════════════════

/// A file or folder in a drive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteItem {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_reference: Option<ParentReference>,
    #[serde(
        rename = "@microsoft.graph.downloadUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RemoteItem {
    /// Folders carry a `folder` facet; anything else is treated as a file.
    pub fn is_folder(&self) -> bool {
        self.folder.is_some()
    }

    /// Replace `parentReference.path` with `drivePath` + `folderPath`.
    pub fn normalize(&mut self) {
        if let Some(parent) = self.parent_reference.as_mut() {
            parent.normalize();
        }
    }
}

/// Location of an item's parent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_path: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ParentReference {
    pub fn normalize(&mut self) {
        if let Some(path) = self.path.take() {
            let (drive_path, folder_path) = split_root_path(&path);
            self.drive_path = Some(drive_path);
            self.folder_path = Some(folder_path);
        }
    }
}

/// Split a Graph path at the first `root:` marker.
///
/// `"/drives/abc/root:/Docs/Reports/"` → `("/drives/abc/root:", "Docs/Reports")`.
/// Without a marker the whole path is the drive path and the folder path is empty.
pub fn split_root_path(path: &str) -> (String, String) {
    match path.split_once(ROOT_PATH_MARKER) {
        Some((drive, folder)) => (
            format!("{}{}", drive, ROOT_PATH_MARKER),
            trim_path(folder).to_string(),
        ),
        None => (path.to_string(), String::new()),
    }
}

/// Strip leading and trailing `/` and `\`.
pub fn trim_path(path: &str) -> &str {
    path.trim_matches(|c| c == '/' || c == '\\')
}

/// One page of an OData collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink", default)]
    pub next_link: Option<String>,
}

/// A drive visible to the signed-in user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Drive {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drive_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// ═══════════════════════════════════════════════════════════════════════
//  Uploads
// ═══════════════════════════════════════════════════════════════════════

/// Response of `createUploadSession`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionInfo {
    pub upload_url: String,
    pub expiration_date_time: Option<String>,
    pub next_expected_ranges: Option<Vec<String>>,
}

/// Server behaviour on a name collision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictBehavior {
    #[default]
    Fail,
    Rename,
}

impl ConflictBehavior {
    pub fn from_auto_rename(auto_rename: bool) -> Self {
        if auto_rename {
            Self::Rename
        } else {
            Self::Fail
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Rename => "rename",
        }
    }
}

/// Progress of a chunked upload, reported after every acknowledged chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub file_name: String,
    pub file_size: u64,
    pub bytes_uploaded: u64,
    pub chunk_index: u64,
    pub completed: bool,
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn split_at_root_marker() {
        assert_eq!(
            split_root_path("/drives/b!xyz/root:/Docs/Reports/"),
            ("/drives/b!xyz/root:".to_string(), "Docs/Reports".to_string())
        );
        assert_eq!(
            split_root_path("/drive/root:"),
            ("/drive/root:".to_string(), String::new())
        );
        assert_eq!(
            split_root_path("/drives/abc/items/01"),
            ("/drives/abc/items/01".to_string(), String::new())
        );
    }

    #[test]
    fn remote_item_keeps_unknown_fields() {
        let raw = json!({
            "id": "01ABC",
            "name": "report.pdf",
            "size": 42,
            "file": {"mimeType": "application/pdf"},
            "eTag": "\"{1}\"",
            "parentReference": {"driveId": "d1", "path": "/drive/root:/Work"},
            "@microsoft.graph.downloadUrl": "https://dl.example/1"
        });
        let mut item: RemoteItem = serde_json::from_value(raw).unwrap();
        assert!(!item.is_folder());
        assert_eq!(item.download_url.as_deref(), Some("https://dl.example/1"));

        item.normalize();
        let out = serde_json::to_value(&item).unwrap();
        assert_eq!(out["eTag"], "\"{1}\"");
        assert_eq!(out["parentReference"]["drivePath"], "/drive/root:");
        assert_eq!(out["parentReference"]["folderPath"], "Work");
        assert!(out["parentReference"].get("path").is_none());
    }

    #[test]
    fn folder_facet_marks_folder() {
        let item: RemoteItem =
            serde_json::from_value(json!({"id": "1", "folder": {"childCount": 0}})).unwrap();
        assert!(item.is_folder());
    }

    #[test]
    fn state_roundtrip_preserves_token_pair() {
        let state: ConnectorState = serde_json::from_value(json!({
            "token": {"access_token": "a1", "refresh_token": "r1", "expires_in": 3600, "ext_expires_in": 3600},
            "code": "c"
        }))
        .unwrap();
        let text = serde_json::to_string(&state).unwrap();
        let back: ConnectorState = serde_json::from_str(&text).unwrap();
        assert_eq!(back, state);
        assert_eq!(
            back.tokens(),
            TokenPair {
                access_token: Some("a1".into()),
                refresh_token: Some("r1".into()),
            }
        );
    }

    #[test]
    fn refresh_only_token_loads() {
        let state: ConnectorState = serde_json::from_value(json!({
            "token": {"refresh_token": "rt"},
            "code": "c",
            "redirect_uri": "http://cb/result"
        }))
        .unwrap();
        assert_eq!(state.code.as_deref(), Some("c"));
        assert_eq!(state.redirect_uri.as_deref(), Some("http://cb/result"));
        assert_eq!(
            state.tokens(),
            TokenPair {
                access_token: None,
                refresh_token: Some("rt".into()),
            }
        );
    }

    #[test]
    fn conflict_behavior_strings() {
        assert_eq!(ConflictBehavior::from_auto_rename(true).as_str(), "rename");
        assert_eq!(ConflictBehavior::from_auto_rename(false).as_str(), "fail");
    }
}
