//! Chunked upload sessions.
//!
//! A session is created with a bearer-authenticated POST to
//! `…/root:/{path}:/createUploadSession`; the bytes then go to the returned
//! `uploadUrl` as sequential `Content-Range` PUTs *without* an Authorization
//! header. A chunk response carrying a non-empty `nextExpectedRanges` means
//! "keep going" (HTTP 202); one without it is the finished drive item
//! (HTTP 201/200). Any failure abandons the session.

use crate::onedrive::authorized::{ApiCall, AuthorizedClient};
use crate::onedrive::endpoints::{normalize_path, upload_session_endpoint};
use crate::onedrive::error::{OneDriveError, OneDriveResult};
use crate::onedrive::transport::HttpRequest;
use crate::onedrive::types::{ConflictBehavior, RemoteItem, UploadProgress, UploadSessionInfo};
use bytes::Bytes;
use log::{debug, info};
use serde_json::{json, Value};
use std::path::Path;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Bytes per PUT: 60 MiB, a multiple of the 320 KiB granularity the service requires.
pub const UPLOAD_CHUNK_SIZE: u64 = 62_914_560;

// ═══════════════════════════════════════════════════════════════════════
//  Chunk sources
// ═══════════════════════════════════════════════════════════════════════

/// Random-access byte source for an upload.
#[async_trait::async_trait]
pub trait ChunkSource: Send {
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Exactly `len` bytes starting at `offset`.
    async fn read_range(&mut self, offset: u64, len: u64) -> OneDriveResult<Bytes>;
}

#[async_trait::async_trait]
impl ChunkSource for Bytes {
    fn len(&self) -> u64 {
        Bytes::len(self) as u64
    }

    async fn read_range(&mut self, offset: u64, len: u64) -> OneDriveResult<Bytes> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= ChunkSource::len(self))
            .ok_or_else(|| OneDriveError::upload("Requested range lies outside the upload data"))?;
        Ok(self.slice(offset as usize..end as usize))
    }
}

/// Reads chunks straight from a file on disk.
pub struct FileChunkSource {
    file: tokio::fs::File,
    len: u64,
}

impl FileChunkSource {
    pub async fn open(path: impl AsRef<Path>) -> OneDriveResult<Self> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        let len = file.metadata().await?.len();
        Ok(Self { file, len })
    }
}

#[async_trait::async_trait]
impl ChunkSource for FileChunkSource {
    fn len(&self) -> u64 {
        self.len
    }

    async fn read_range(&mut self, offset: u64, len: u64) -> OneDriveResult<Bytes> {
        let size = usize::try_from(len)
            .map_err(|_| OneDriveError::upload("Chunk does not fit in memory"))?;
        self.file.seek(std::io::SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; size];
        self.file.read_exact(&mut buf).await?;
        Ok(Bytes::from(buf))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Uploader
// ═══════════════════════════════════════════════════════════════════════

/// Where and how to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub drive_id: Option<String>,
    /// Drive-relative destination, including the file name.
    pub path: String,
    pub conflict: ConflictBehavior,
}

pub struct ChunkedUploader<'a> {
    client: &'a mut AuthorizedClient,
    chunk_size: u64,
}

impl<'a> ChunkedUploader<'a> {
    pub fn new(client: &'a mut AuthorizedClient) -> Self {
        Self {
            client,
            chunk_size: UPLOAD_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Upload `file_size` bytes from `source`, reporting progress after
    /// every acknowledged chunk. Returns the created drive item.
    pub async fn upload(
        &mut self,
        source: &mut dyn ChunkSource,
        file_size: u64,
        target: &UploadTarget,
        mut on_progress: impl FnMut(&UploadProgress) + Send,
    ) -> OneDriveResult<RemoteItem> {
        if file_size == 0 || source.is_empty() {
            return Err(OneDriveError::validation(
                "File size is 0. Please provide a non-empty file to upload",
            ));
        }
        if source.len() != file_size {
            return Err(OneDriveError::validation(format!(
                "File size mismatch: expected {} bytes, source holds {}",
                file_size,
                source.len()
            )));
        }

        let session = self.create_session(target).await?;
        let rest = self.client.context().rest.clone();
        let mut progress = UploadProgress {
            file_name: file_name_of(&target.path),
            file_size,
            bytes_uploaded: 0,
            chunk_index: 0,
            completed: false,
        };

        let mut cursor: u64 = 0;
        loop {
            let len = self.chunk_size.min(file_size - cursor);
            let data = source.read_range(cursor, len).await?;
            let range = format!("bytes {}-{}/{}", cursor, cursor + len - 1, file_size);
            debug!("PUT {} ({})", progress.file_name, range);

            let request = HttpRequest::put(&session.upload_url)
                .header("Content-Length", len.to_string())
                .header("Content-Range", range)
                .bytes(data);
            let response = rest.execute(&request).await?;

            cursor += len;
            progress.bytes_uploaded = cursor;
            progress.chunk_index += 1;

            if expects_more(&response) {
                if cursor >= file_size {
                    return Err(OneDriveError::upload(format!(
                        "Server still expects ranges {} after all {} bytes were sent",
                        response["nextExpectedRanges"], file_size
                    )));
                }
                on_progress(&progress);
                continue;
            }

            let mut item: RemoteItem = serde_json::from_value(response)?;
            item.normalize();
            progress.completed = true;
            on_progress(&progress);
            info!(
                "Upload complete: {} ({} bytes, {} chunks)",
                progress.file_name, file_size, progress.chunk_index
            );
            return Ok(item);
        }
    }

    async fn create_session(&mut self, target: &UploadTarget) -> OneDriveResult<UploadSessionInfo> {
        let endpoint = upload_session_endpoint(target.drive_id.as_deref(), &target.path)?;
        let body = json!({
            "item": {"@microsoft.graph.conflictBehavior": target.conflict.as_str()}
        });
        let response = self.client.call(&ApiCall::post_json(endpoint, body)).await?;
        let session: UploadSessionInfo = serde_json::from_value(response).map_err(|e| {
            OneDriveError::upload(format!("Invalid upload session response: {}", e))
        })?;
        debug!("Upload session created, expires {:?}", session.expiration_date_time);
        Ok(session)
    }
}

fn expects_more(response: &Value) -> bool {
    response
        .get("nextExpectedRanges")
        .and_then(Value::as_array)
        .is_some_and(|ranges| !ranges.is_empty())
}

fn file_name_of(path: &str) -> String {
    normalize_path(path)
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
