//! The closed set of connector actions and their result envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One request to the connector, as received from the host.
///
/// ```json
/// {"action": "list_items", "drive_id": "b!x", "folder_path": "/Docs"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    TestConnectivity,
    ListItems {
        drive_id: Option<String>,
        folder_id: Option<String>,
        folder_path: Option<String>,
    },
    ListDrives,
    GetFile {
        drive_id: Option<String>,
        file_id: Option<String>,
        file_path: Option<String>,
    },
    UploadFile {
        vault_id: String,
        /// Destination path in the drive, file name included.
        file_path: String,
        drive_id: Option<String>,
        #[serde(default)]
        auto_rename: bool,
    },
    DeleteFile {
        drive_id: Option<String>,
        file_id: Option<String>,
        file_path: Option<String>,
    },
    DeleteFolder {
        drive_id: Option<String>,
        folder_id: Option<String>,
        folder_path: Option<String>,
    },
    CreateFolder {
        folder_name: String,
        drive_id: Option<String>,
        folder_id: Option<String>,
        folder_path: Option<String>,
        #[serde(default)]
        auto_rename: bool,
    },
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::TestConnectivity => "test_connectivity",
            Self::ListItems { .. } => "list_items",
            Self::ListDrives => "list_drives",
            Self::GetFile { .. } => "get_file",
            Self::UploadFile { .. } => "upload_file",
            Self::DeleteFile { .. } => "delete_file",
            Self::DeleteFolder { .. } => "delete_folder",
            Self::CreateFolder { .. } => "create_folder",
        }
    }
}

/// Terminal result of a successful action.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionOutcome {
    pub message: String,
    pub summary: Map<String, Value>,
    pub data: Vec<Value>,
}

impl ActionOutcome {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_summary(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.summary.insert(key.to_string(), value.into());
        self
    }

    pub fn with_data(mut self, data: Vec<Value>) -> Self {
        self.data = data;
        self
    }
}
