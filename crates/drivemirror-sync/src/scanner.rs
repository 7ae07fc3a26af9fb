//! Local file scanner
//!
//! Walks the local mirror and compares every file against the last known
//! remote and local state at the same path. New and changed files are
//! marked `PendingUpload`; the transfer service picks them up later.
//!
//! ## Reconciliation rules
//!
//! | Remote item | Local record              | Action                         |
//! |-------------|---------------------------|--------------------------------|
//! | none        | none                      | create, `PendingUpload` (new)  |
//! | none        | not `PendingUpload`       | re-mark `PendingUpload` (new)  |
//! | none        | `PendingUpload`           | nothing                        |
//! | present     | any                       | `PendingUpload` if modified    |
//!
//! A file is modified when it was written after the reference time, when
//! its size differs from the reference size, or when both a local hash and
//! a non-empty remote are available and the hashes differ. The reference is
//! the remote item, except that a stored record last brought in sync
//! (downloaded or uploaded) supplies the size and, when later, the write
//! time. Without a local hash only size and time are compared.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use drivemirror_core::domain::{
    newtypes::LocalFileId, to_stored_precision, LocalFile, RemoteItem, SyncState,
};
use drivemirror_core::ports::{ILocalFileAccess, IStateRepository, LocalFileInfo};

use crate::SyncError;

/// Counters reported by a scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Files enumerated
    pub processed: u64,
    /// Files marked for upload with no remote counterpart
    pub new_files: u64,
    /// Files marked for upload because they differ from the remote item
    pub modified: u64,
}

/// What reconciling one file did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    New,
    Modified,
    Unchanged,
}

/// Marks new and changed local files as pending upload
pub struct LocalFileScanner {
    local: Arc<dyn ILocalFileAccess>,
    repository: Arc<dyn IStateRepository>,
}

impl LocalFileScanner {
    pub fn new(local: Arc<dyn ILocalFileAccess>, repository: Arc<dyn IStateRepository>) -> Self {
        Self { local, repository }
    }

    /// Enumerates local files and reconciles each against stored state
    ///
    /// Cancellation is checked between files; files already reconciled
    /// keep their new state.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn scan(&self, cancel: &CancellationToken) -> Result<ScanOutcome, SyncError> {
        let files = self
            .local
            .enumerate_files()
            .await
            .context("Failed to enumerate local files")?;

        let mut outcome = ScanOutcome::default();

        for info in &files {
            if cancel.is_cancelled() {
                info!(processed = outcome.processed, "Local scan cancelled");
                return Err(SyncError::Cancelled);
            }

            outcome.processed += 1;
            match self.reconcile(info).await? {
                Change::New => outcome.new_files += 1,
                Change::Modified => outcome.modified += 1,
                Change::Unchanged => {}
            }
        }

        info!(
            processed = outcome.processed,
            new_files = outcome.new_files,
            modified = outcome.modified,
            "Local scan complete"
        );
        Ok(outcome)
    }

    async fn reconcile(&self, info: &LocalFileInfo) -> Result<Change, SyncError> {
        let path = &info.relative_path;
        let stored = self
            .repository
            .get_local_file_by_path(path)
            .await
            .with_context(|| format!("Failed to look up local file {path}"))?;
        let remote = self
            .repository
            .get_remote_item_by_path(path)
            .await
            .with_context(|| format!("Failed to look up remote item {path}"))?;

        let change = match (remote, stored) {
            (None, None) => {
                let file = LocalFile::new(
                    LocalFileId::generate(),
                    path.clone(),
                    info.size,
                    info.last_write_time,
                    SyncState::PendingUpload,
                )
                .with_hash(info.hash.clone());
                self.save(&file).await?;
                Change::New
            }
            (None, Some(existing)) if existing.state != SyncState::PendingUpload => {
                let file = refreshed(existing, info);
                self.save(&file).await?;
                Change::New
            }
            (None, Some(_)) => Change::Unchanged,
            (Some(remote), stored) => {
                if !is_modified(info, &remote, stored.as_ref()) {
                    return Ok(Change::Unchanged);
                }

                let file = match stored {
                    Some(existing) => {
                        let file = refreshed(existing.clone(), info);
                        if existing.state == SyncState::PendingUpload
                            && !file.content_differs(&existing)
                        {
                            return Ok(Change::Unchanged);
                        }
                        file
                    }
                    None => LocalFile::new(
                        LocalFileId::from(&remote.id),
                        path.clone(),
                        info.size,
                        info.last_write_time,
                        SyncState::PendingUpload,
                    )
                    .with_hash(info.hash.clone()),
                };
                self.save(&file).await?;
                Change::Modified
            }
        };

        debug!(path = %path, ?change, "Reconciled local file");
        Ok(change)
    }

    async fn save(&self, file: &LocalFile) -> Result<(), SyncError> {
        self.repository
            .add_or_update_local_file(file)
            .await
            .with_context(|| format!("Failed to save local file {}", file.path))?;
        Ok(())
    }
}

/// Copies the scanned metadata onto a stored record and marks it pending
fn refreshed(existing: LocalFile, info: &LocalFileInfo) -> LocalFile {
    let hash = info.hash.clone().or_else(|| existing.hash.clone());
    existing
        .with_size(info.size)
        .with_last_write_time(info.last_write_time)
        .with_hash(hash)
        .with_state(SyncState::PendingUpload)
}

/// Write time and size a local file is compared against
fn reference(remote: &RemoteItem, stored: Option<&LocalFile>) -> (DateTime<Utc>, u64) {
    match stored {
        Some(file) if file.state.is_in_sync() => {
            (remote.last_modified.max(file.last_write_time), file.size)
        }
        _ => (remote.last_modified, remote.size),
    }
}

fn is_modified(info: &LocalFileInfo, remote: &RemoteItem, stored: Option<&LocalFile>) -> bool {
    let (reference_time, reference_size) = reference(remote, stored);
    // References come from storage, which keeps microseconds only.
    let write_time = to_stored_precision(info.last_write_time);
    if write_time > reference_time || info.size != reference_size {
        return true;
    }

    // Hash comparison is opportunistic: skipped when no local hash was computed.
    match &info.hash {
        Some(local_hash) if remote.size > 0 => stored
            .and_then(|f| f.hash.as_ref())
            .or(remote.hash.as_ref())
            .is_some_and(|known| known != local_hash),
        _ => false,
    }
}
