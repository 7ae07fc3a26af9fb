//! Remote client port (driven/secondary port)
//!
//! This module defines the interface for talking to the remote drive:
//! a paginated delta feed, content download, chunked resumable upload, and
//! a single-request upload for content too small for a session.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are adapter-specific
//!   and don't need domain-level classification.
//! - Uses `#[async_trait]` for async trait methods.
//! - The `DeltaItem` struct is a port-level DTO, not a domain entity;
//!   the delta page processor is responsible for mapping it to `RemoteItem`.
//! - Timeouts are the adapter's concern. Callers own retry count and backoff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

use crate::domain::newtypes::{RemoteId, RemotePath};

/// Streamed file content
pub type ContentStream = Box<dyn AsyncRead + Send + Unpin>;

// ============================================================================
// DeltaPage and DeltaItem structs
// ============================================================================

/// One page of the delta feed
///
/// A page carries either a `next_link` (more pages follow) or a
/// `delta_link` (enumeration is complete and the link holds the token
/// for the next incremental run). Some pages carry neither.
#[derive(Debug, Clone, Default)]
pub struct DeltaPage {
    /// Items changed since the requested position
    pub items: Vec<DeltaItem>,
    /// Absolute URL of the next page, if any
    pub next_link: Option<String>,
    /// Absolute URL containing the resumption token, present on the final page
    pub delta_link: Option<String>,
}

/// A single item from a delta page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaItem {
    /// Provider-specific item identifier
    pub id: String,
    /// Item name (file or folder name)
    pub name: String,
    /// Full drive path of the item, e.g. "/Documents/a.txt" (often None for deleted items)
    pub path: Option<String>,
    /// File size in bytes (None for folders or deleted items)
    pub size: Option<u64>,
    /// Content hash (quickXorHash, Base64)
    pub hash: Option<String>,
    /// Last modified timestamp
    pub modified: Option<DateTime<Utc>>,
    /// Entity tag
    pub etag: Option<String>,
    /// Content tag
    pub ctag: Option<String>,
    /// Whether this item has been deleted since the last delta
    pub is_deleted: bool,
    /// Whether this item is a folder
    pub is_directory: bool,
    /// Whether this item is the drive root itself
    pub is_root: bool,
    /// Parent folder ID
    pub parent_id: Option<String>,
}

// ============================================================================
// UploadSession struct
// ============================================================================

/// Server-side handle for a resumable upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    /// Absolute URL that receives the byte-range PUTs
    pub upload_url: String,
    /// Client-visible identifier of the session
    pub id: String,
    /// When the server discards the session, if reported
    pub expires_at: Option<DateTime<Utc>>,
}

// ============================================================================
// IRemoteClient trait
// ============================================================================

/// Port trait for remote drive operations
#[async_trait::async_trait]
pub trait IRemoteClient: Send + Sync {
    /// Fetches one page of the delta feed
    ///
    /// `position` is `None` for a full enumeration, a stored resumption
    /// token, or an absolute continuation link returned by a previous page.
    async fn get_delta_page(&self, position: Option<&str>) -> anyhow::Result<DeltaPage>;

    /// Opens a stream over the content of a remote file
    async fn download_content(&self, id: &RemoteId) -> anyhow::Result<ContentStream>;

    /// Creates a resumable upload session for `parent/file_name`
    async fn create_upload_session(
        &self,
        parent: &RemotePath,
        file_name: &str,
    ) -> anyhow::Result<UploadSession>;

    /// Creates or replaces `parent/file_name` with `content` in one request
    ///
    /// Used for empty files, which an upload session cannot complete.
    async fn upload_small(
        &self,
        parent: &RemotePath,
        file_name: &str,
        content: &[u8],
    ) -> anyhow::Result<()>;

    /// Sends one contiguous byte range of the file
    ///
    /// `range_end` is inclusive, so `chunk.len() == range_end - range_start + 1`.
    async fn upload_chunk(
        &self,
        session: &UploadSession,
        chunk: &[u8],
        range_start: u64,
        range_end: u64,
        total_len: u64,
    ) -> anyhow::Result<()>;
}
