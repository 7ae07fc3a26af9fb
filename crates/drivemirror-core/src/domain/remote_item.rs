//! Remote item snapshot
//!
//! A `RemoteItem` records the last state of a drive entry as observed in a
//! fully applied delta page. Deleted entries are kept as tombstones so that
//! re-applying the same page stays idempotent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{FileHash, RelativePath, RemoteId};
use super::timestamp::to_stored_precision;

/// Snapshot of a file or folder in the remote drive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    /// Drive item identifier
    pub id: RemoteId,
    /// Path relative to the drive root
    pub path: RelativePath,
    /// Entity tag (changes on any metadata or content change)
    pub etag: Option<String>,
    /// Content tag (changes only when content changes)
    pub ctag: Option<String>,
    /// Size in bytes (0 for folders)
    pub size: u64,
    /// Last modification time reported by the drive
    pub last_modified: DateTime<Utc>,
    /// Whether the item is a folder
    pub is_folder: bool,
    /// Whether the item has been deleted remotely
    pub is_deleted: bool,
    /// Remote content hash (files only)
    pub hash: Option<FileHash>,
}

impl RemoteItem {
    /// Creates a snapshot for a live (non-deleted) file
    ///
    /// `last_modified` is kept at stored precision.
    pub fn file(
        id: RemoteId,
        path: RelativePath,
        size: u64,
        last_modified: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            path,
            etag: None,
            ctag: None,
            size,
            last_modified: to_stored_precision(last_modified),
            is_folder: false,
            is_deleted: false,
            hash: None,
        }
    }

    /// Creates a snapshot for a live folder
    pub fn folder(id: RemoteId, path: RelativePath, last_modified: DateTime<Utc>) -> Self {
        Self {
            is_folder: true,
            ..Self::file(id, path, 0, last_modified)
        }
    }

    /// Returns a copy with the given content hash
    #[must_use]
    pub fn with_hash(self, hash: FileHash) -> Self {
        Self {
            hash: Some(hash),
            ..self
        }
    }

    /// Returns a copy with the given change tags
    #[must_use]
    pub fn with_tags(self, etag: Option<String>, ctag: Option<String>) -> Self {
        Self { etag, ctag, ..self }
    }

    /// Returns a tombstone copy of this item
    #[must_use]
    pub fn deleted(self) -> Self {
        Self {
            is_deleted: true,
            ..self
        }
    }

    /// Returns true if the item is a live file whose content can be downloaded
    pub fn is_downloadable(&self) -> bool {
        !self.is_folder && !self.is_deleted
    }
}
