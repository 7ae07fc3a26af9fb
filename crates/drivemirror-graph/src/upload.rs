//! Upload operations for Microsoft Graph API (OneDrive)
//!
//! Non-empty files go through a resumable upload session:
//! - [`create_upload_session`] - `POST /me/drive/root:{parent}/{name}:/createUploadSession`
//! - [`upload_chunk`] - `PUT {uploadUrl}` with a `Content-Range` header
//!
//! A session only completes once it has received a byte range, so empty
//! files use [`upload_small`] (`PUT /me/drive/root:{parent}/{name}:/content`).
//!
//! The session URL is pre-authenticated, so chunk requests carry no
//! Authorization header. Intermediate chunks are answered with
//! `202 Accepted`; the final chunk with `200 OK` or `201 Created`.
//!
//! ## Microsoft Graph API References
//!
//! - [Upload large files](https://learn.microsoft.com/en-us/graph/api/driveitem-createuploadsession)
//! - [Upload small files](https://learn.microsoft.com/en-us/graph/api/driveitem-put-content)

use chrono::{DateTime, Utc};
use drivemirror_core::domain::newtypes::RemotePath;
use drivemirror_core::ports::UploadSession;
use reqwest::{header, Method, StatusCode};
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::client::{ensure_success, GraphClient, REQUEST_TIMEOUT};
use crate::GraphError;

/// Largest body accepted by the simple upload API: 4 MiB
pub const SMALL_UPLOAD_LIMIT: usize = 4 * 1024 * 1024;

/// Response from creating an upload session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadSessionResponse {
    /// The URL to use for uploading chunks
    upload_url: String,
    expiration_date_time: Option<DateTime<Utc>>,
}

/// How the server answered a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    /// More ranges are expected (202)
    Accepted,
    /// The file is complete (200 or 201)
    Completed,
}

/// Builds an item-by-path URL ending in `action`
///
/// - Root: `/me/drive/root:/{name}:/{action}`
/// - Subfolder: `/me/drive/root:{parent}/{name}:/{action}`
fn item_url(
    client: &GraphClient,
    parent: &RemotePath,
    name: &str,
    action: &str,
) -> Result<Url, GraphError> {
    if name.is_empty() || name.contains('/') {
        return Err(GraphError::InvalidRequest(format!(
            "invalid file name for upload: {name:?}"
        )));
    }

    let target = format!("{name}:");
    let segments = ["me", "drive", "root:"]
        .into_iter()
        .chain(parent.as_str().split('/').filter(|s| !s.is_empty()))
        .chain([target.as_str(), action]);
    client.endpoint(segments)
}

/// Last path segment of the upload URL, which names the session
fn session_id(upload_url: &str) -> String {
    Url::parse(upload_url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| upload_url.to_string())
}

/// Creates a resumable upload session for `parent/name`
///
/// Conflicts are resolved by replacing the remote item.
pub async fn create_upload_session(
    client: &GraphClient,
    parent: &RemotePath,
    name: &str,
) -> Result<UploadSession, GraphError> {
    let url = item_url(client, parent, name, "createUploadSession")?;
    debug!(%parent, name, "Creating upload session");

    let body = serde_json::json!({
        "item": { "@microsoft.graph.conflictBehavior": "replace" }
    });
    let response = client
        .request_url(Method::POST, url.as_str())
        .json(&body)
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?;
    let response = ensure_success(response).await?;
    let bytes = response.bytes().await?;
    let session: UploadSessionResponse = serde_json::from_slice(&bytes)
        .map_err(|e| GraphError::InvalidResponse(format!("upload session: {e}")))?;

    debug!(upload_url = %session.upload_url, "Upload session created");
    Ok(UploadSession {
        id: session_id(&session.upload_url),
        upload_url: session.upload_url,
        expires_at: session.expiration_date_time,
    })
}

/// Creates or replaces `parent/name` with `data` in a single request
///
/// Bodies above [`SMALL_UPLOAD_LIMIT`] are rejected before sending.
pub async fn upload_small(
    client: &GraphClient,
    parent: &RemotePath,
    name: &str,
    data: &[u8],
) -> Result<(), GraphError> {
    if data.len() > SMALL_UPLOAD_LIMIT {
        return Err(GraphError::InvalidRequest(format!(
            "{} bytes is too large for a simple upload",
            data.len()
        )));
    }

    let url = item_url(client, parent, name, "content")?;
    debug!(%parent, name, bytes = data.len(), "Uploading small file");

    let response = client
        .request_url(Method::PUT, url.as_str())
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(data.to_vec())
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?;
    ensure_success(response).await?;
    Ok(())
}

/// Uploads one byte range to an upload session
///
/// `range_end` is inclusive. The chunk length must match the range.
pub async fn upload_chunk(
    client: &GraphClient,
    session: &UploadSession,
    chunk: &[u8],
    range_start: u64,
    range_end: u64,
    total_len: u64,
) -> Result<ChunkStatus, GraphError> {
    let expected = range_end
        .checked_sub(range_start)
        .map(|span| span + 1)
        .filter(|&len| range_end < total_len && len == chunk.len() as u64);
    if expected.is_none() {
        return Err(GraphError::InvalidRequest(format!(
            "chunk of {} bytes does not fit range {range_start}-{range_end}/{total_len}",
            chunk.len()
        )));
    }

    let content_range = format!("bytes {range_start}-{range_end}/{total_len}");
    debug!(session = %session.id, %content_range, "Uploading chunk");

    let response = client
        .http()
        .put(&session.upload_url)
        .header(header::CONTENT_LENGTH, chunk.len())
        .header(header::CONTENT_RANGE, &content_range)
        .body(chunk.to_vec())
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?;
    let response = ensure_success(response).await?;

    match response.status() {
        StatusCode::ACCEPTED => Ok(ChunkStatus::Accepted),
        StatusCode::OK | StatusCode::CREATED => Ok(ChunkStatus::Completed),
        other => Err(GraphError::InvalidResponse(format!(
            "unexpected chunk status {other} for {content_range}"
        ))),
    }
}
