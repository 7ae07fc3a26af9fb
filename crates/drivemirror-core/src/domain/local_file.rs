//! Local file snapshot and sync state
//!
//! `LocalFile` values are immutable: every update produces a new value that
//! the caller writes back through the state repository.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{FileHash, LocalFileId, RelativePath};
use super::timestamp::to_stored_precision;

/// Local reconciliation status of a file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// State has not been determined yet
    #[default]
    Unknown,
    /// Remote content must be fetched
    PendingDownload,
    /// Local copy matches the remote content that was downloaded
    Downloaded,
    /// Local content must be sent to the drive
    PendingUpload,
    /// Local content was sent to the drive
    Uploaded,
    /// File was removed
    Deleted,
    /// Last transfer attempt failed terminally
    Error,
}

impl SyncState {
    /// Every state, in declaration order
    pub const ALL: [SyncState; 7] = [
        SyncState::Unknown,
        SyncState::PendingDownload,
        SyncState::Downloaded,
        SyncState::PendingUpload,
        SyncState::Uploaded,
        SyncState::Deleted,
        SyncState::Error,
    ];

    /// Stable lowercase name, used for storage and logging
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Unknown => "unknown",
            SyncState::PendingDownload => "pending_download",
            SyncState::Downloaded => "downloaded",
            SyncState::PendingUpload => "pending_upload",
            SyncState::Uploaded => "uploaded",
            SyncState::Deleted => "deleted",
            SyncState::Error => "error",
        }
    }

    /// Returns true when the local copy is known to match the drive
    pub fn is_in_sync(&self) -> bool {
        matches!(self, SyncState::Downloaded | SyncState::Uploaded)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a file in the local mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub id: LocalFileId,
    pub path: RelativePath,
    pub hash: Option<FileHash>,
    pub size: u64,
    pub last_write_time: DateTime<Utc>,
    pub state: SyncState,
}

impl LocalFile {
    /// Creates a new local file record
    ///
    /// `last_write_time` is kept at stored precision.
    pub fn new(
        id: LocalFileId,
        path: RelativePath,
        size: u64,
        last_write_time: DateTime<Utc>,
        state: SyncState,
    ) -> Self {
        Self {
            id,
            path,
            hash: None,
            size,
            last_write_time: to_stored_precision(last_write_time),
            state,
        }
    }

    #[must_use]
    pub fn with_state(self, state: SyncState) -> Self {
        Self { state, ..self }
    }

    #[must_use]
    pub fn with_hash(self, hash: Option<FileHash>) -> Self {
        Self { hash, ..self }
    }

    #[must_use]
    pub fn with_size(self, size: u64) -> Self {
        Self { size, ..self }
    }

    #[must_use]
    pub fn with_last_write_time(self, last_write_time: DateTime<Utc>) -> Self {
        Self {
            last_write_time: to_stored_precision(last_write_time),
            ..self
        }
    }

    /// Returns true if size, hash or last-write time differ from `other`
    pub fn content_differs(&self, other: &LocalFile) -> bool {
        self.size != other.size
            || self.hash != other.hash
            || self.last_write_time != other.last_write_time
    }
}
