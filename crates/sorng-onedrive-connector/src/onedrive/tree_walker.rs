//! Depth-first listing of a folder hierarchy.
//!
//! Every page of a folder is fetched (following `@odata.nextLink`) before any
//! of its subfolders is entered; subfolders are then entered in server order,
//! each one fully before its next sibling. The result is a pre-order listing.
//! Traversal uses an explicit stack of per-folder iterators, so depth is only
//! bounded by memory.

use crate::onedrive::authorized::{ApiCall, AuthorizedClient};
use crate::onedrive::endpoints::folder_children_endpoint;
use crate::onedrive::error::{OneDriveError, OneDriveErrorKind, OneDriveResult};
use crate::onedrive::types::{Page, RemoteItem};
use log::{debug, warn};
use serde::Serialize;
use std::collections::HashSet;

/// Items in walk order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreeListing {
    pub items: Vec<RemoteItem>,
}

impl TreeListing {
    pub fn files(&self) -> impl Iterator<Item = &RemoteItem> {
        self.items.iter().filter(|i| !i.is_folder())
    }

    pub fn folders(&self) -> impl Iterator<Item = &RemoteItem> {
        self.items.iter().filter(|i| i.is_folder())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

pub struct TreeWalker<'a> {
    client: &'a mut AuthorizedClient,
    max_items: Option<usize>,
}

impl<'a> TreeWalker<'a> {
    pub fn new(client: &'a mut AuthorizedClient) -> Self {
        let max_items = client.context().config.walk_max_items;
        Self { client, max_items }
    }

    pub fn with_max_items(mut self, max_items: Option<usize>) -> Self {
        self.max_items = max_items;
        self
    }

    /// Walk everything below `start_endpoint` (a children endpoint).
    ///
    /// Subfolders are listed in `drive_id` when given, otherwise in the
    /// signed-in user's drive. The first failed fetch aborts the walk.
    pub async fn walk(
        &mut self,
        start_endpoint: &str,
        drive_id: Option<&str>,
    ) -> OneDriveResult<TreeListing> {
        let mut items = self
            .collect(start_endpoint, drive_id)
            .await
            .map_err(|e| e.context(" Error while listing items"))?;
        for item in items.iter_mut() {
            item.normalize();
        }
        debug!("Listed {} items below {}", items.len(), start_endpoint);
        Ok(TreeListing { items })
    }

    async fn collect(
        &mut self,
        start_endpoint: &str,
        drive_id: Option<&str>,
    ) -> OneDriveResult<Vec<RemoteItem>> {
        let mut listing = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack = vec![self.fetch_all(start_endpoint).await?.into_iter()];

        while let Some(children) = stack.last_mut() {
            let Some(item) = children.next() else {
                stack.pop();
                continue;
            };
            let subfolder = item.is_folder().then(|| item.id.clone());
            listing.push(item);
            self.check_budget(listing.len())?;

            if let Some(id) = subfolder {
                if !visited.insert(id.clone()) {
                    warn!("Folder {} already listed in this walk, not descending again", id);
                    continue;
                }
                let endpoint = folder_children_endpoint(drive_id, &id);
                stack.push(self.fetch_all(&endpoint).await?.into_iter());
            }
        }
        Ok(listing)
    }

    /// All pages of one folder, concatenated.
    async fn fetch_all(&mut self, endpoint: &str) -> OneDriveResult<Vec<RemoteItem>> {
        let mut items = Vec::new();
        let mut seen_links: HashSet<String> = HashSet::new();
        let mut next = Some(endpoint.to_string());

        while let Some(url) = next.take() {
            let body = self.client.call(&ApiCall::get(url.as_str())).await?;
            let page: Page<RemoteItem> = serde_json::from_value(body)?;
            items.extend(page.value);

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
        Ok(items)
    }

    fn check_budget(&self, collected: usize) -> OneDriveResult<()> {
        match self.max_items {
            Some(max) if collected > max => Err(OneDriveError::validation(format!(
                "Listing exceeded the configured limit of {} items",
                max
            ))),
            _ => Ok(()),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
