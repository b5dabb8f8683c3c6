//! Graph endpoint selection.
//!
//! Items are addressed either by id or by path, inside a specific drive or
//! the signed-in user's default drive:
//!
//! | drive | target | item                         | children                              |
//! |-------|--------|------------------------------|---------------------------------------|
//! | –     | root   | `/me/drive/root`             | `/me/drive/root/children`             |
//! | –     | id     | `/me/drive/items/{id}`       | `/me/drive/items/{id}/children`       |
//! | –     | path   | `/me/drive/root:/{p}`        | `/me/drive/root:/{p}:/children`       |
//! | d     | root   | `/drives/{d}/root`           | `/drives/{d}/root/children`           |
//! | d     | id     | `/drives/{d}/items/{id}`     | `/drives/{d}/items/{id}/children`     |
//! | d     | path   | `/drives/{d}/root:/{p}`      | `/drives/{d}/root:/{p}:/children`     |

use crate::onedrive::error::{OneDriveError, OneDriveResult};
use crate::onedrive::types::trim_path;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped inside a single path segment.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\')
    .add(b'|')
    .add(b'^');

/// What inside a drive is being addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemTarget {
    Root,
    Id(String),
    /// Drive-relative path without leading or trailing separators.
    Path(String),
}

/// A drive plus a target within it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemLocator {
    pub drive_id: Option<String>,
    pub target: ItemTarget,
}

impl ItemLocator {
    pub fn root(drive_id: Option<&str>) -> Self {
        Self {
            drive_id: non_empty(drive_id).map(String::from),
            target: ItemTarget::Root,
        }
    }

    /// An id wins over a path; neither (or only blanks) means the drive root.
    pub fn from_params(drive_id: Option<&str>, item_id: Option<&str>, item_path: Option<&str>) -> Self {
        let drive_id = non_empty(drive_id).map(String::from);
        let target = if let Some(id) = non_empty(item_id) {
            ItemTarget::Id(id.to_string())
        } else {
            match item_path.map(normalize_path).filter(|p| !p.is_empty()) {
                Some(path) => ItemTarget::Path(path),
                None => ItemTarget::Root,
            }
        };
        Self { drive_id, target }
    }

    /// Like `from_params`, but the drive root is not an acceptable answer.
    pub fn require_item(
        drive_id: Option<&str>,
        item_id: Option<&str>,
        item_path: Option<&str>,
        what: &str,
    ) -> OneDriveResult<Self> {
        let locator = Self::from_params(drive_id, item_id, item_path);
        if locator.target == ItemTarget::Root {
            return Err(OneDriveError::validation(format!(
                "Please provide either {what}_id or {what}_path"
            )));
        }
        Ok(locator)
    }

    fn drive_base(&self) -> String {
        match &self.drive_id {
            Some(drive) => format!("/drives/{}", encode_segment(drive)),
            None => "/me/drive".to_string(),
        }
    }

    pub fn item_endpoint(&self) -> String {
        let base = self.drive_base();
        match &self.target {
            ItemTarget::Root => format!("{}/root", base),
            ItemTarget::Id(id) => format!("{}/items/{}", base, encode_segment(id)),
            ItemTarget::Path(path) => format!("{}/root:/{}", base, encode_path(path)),
        }
    }

    pub fn children_endpoint(&self) -> String {
        let base = self.drive_base();
        match &self.target {
            ItemTarget::Root => format!("{}/root/children", base),
            ItemTarget::Id(id) => format!("{}/items/{}/children", base, encode_segment(id)),
            ItemTarget::Path(path) => format!("{}/root:/{}:/children", base, encode_path(path)),
        }
    }
}

/// Children of a folder found during a walk.
pub fn folder_children_endpoint(drive_id: Option<&str>, folder_id: &str) -> String {
    ItemLocator {
        drive_id: non_empty(drive_id).map(String::from),
        target: ItemTarget::Id(folder_id.to_string()),
    }
    .children_endpoint()
}

/// `createUploadSession` for a drive-relative destination path.
pub fn upload_session_endpoint(drive_id: Option<&str>, path: &str) -> OneDriveResult<String> {
    let path = normalize_path(path);
    if path.is_empty() {
        return Err(OneDriveError::validation("Please provide a valid destination file path"));
    }
    let locator = ItemLocator {
        drive_id: non_empty(drive_id).map(String::from),
        target: ItemTarget::Path(path),
    };
    Ok(format!("{}:/createUploadSession", locator.item_endpoint()))
}

pub const MY_DRIVES: &str = "/me/drives";
pub const ME: &str = "/me";

/// Trim separators and turn Windows separators into `/`.
pub fn normalize_path(path: &str) -> String {
    trim_path(path).replace('\\', "/")
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join("/")
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
