//! Drive enumeration and the signed-in user's profile.

use crate::onedrive::authorized::{ApiCall, AuthorizedClient};
use crate::onedrive::endpoints::{ME, MY_DRIVES};
use crate::onedrive::error::{OneDriveError, OneDriveErrorKind, OneDriveResult};
use crate::onedrive::types::{Drive, Page};
use log::debug;
use serde_json::Value;
use std::collections::HashSet;

/// Drive operations.
pub struct OneDriveDrives<'a> {
    client: &'a mut AuthorizedClient,
}

impl<'a> OneDriveDrives<'a> {
    pub fn new(client: &'a mut AuthorizedClient) -> Self {
        Self { client }
    }

    /// Every drive available to the current user, across all pages.
    pub async fn list_my_drives(&mut self) -> OneDriveResult<Vec<Drive>> {
        let mut drives = Vec::new();
        let mut seen_links = HashSet::new();
        let mut next = Some(MY_DRIVES.to_string());

        while let Some(url) = next.take() {
            let resp = self.client.call(&ApiCall::get(url)).await?;
            let page: Page<Drive> = serde_json::from_value(resp)?;
            drives.extend(page.value);
            if let Some(link) = page.next_link {
                if !seen_links.insert(link.clone()) {
                    return Err(OneDriveError::new(
                        OneDriveErrorKind::ApiError,
                        format!("Pagination loop detected: {} was returned twice", link),
                    ));
                }
                next = Some(link);
            }
        }
        debug!("Found {} drives", drives.len());
        Ok(drives)
    }

    /// `GET /me`, used to prove a fresh token works.
    pub async fn me(&mut self) -> OneDriveResult<Value> {
        self.client.call(&ApiCall::get(ME)).await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
