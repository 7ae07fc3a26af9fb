//! State repository port (driven/secondary port)
//!
//! This module defines the interface for persisting and querying
//! synchronization state: remote item snapshots, local file snapshots,
//! the resumption token, and transfer logs.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification.
//! - Every mutation is transaction-scoped. `apply_remote_items` in
//!   particular is all-or-nothing: a failure leaves no row of the batch behind.
//! - Pagination uses a page index, not a row offset: `page_index = 1`
//!   with `page_size = 3` returns rows 4..=6.

use crate::domain::{
    newtypes::{RelativePath, RemoteId},
    LocalFile, RemoteItem, ResumptionToken, SyncState, TransferLog,
};

// ============================================================================
// IStateRepository trait
// ============================================================================

/// Port trait for persistent sync state
///
/// ## Eligibility rules
///
/// - A remote item is pending download when it is a non-deleted file and no
///   local file in `Downloaded` or `Uploaded` state matches it by id or path.
/// - A local file is pending upload when its state is `PendingUpload`.
#[async_trait::async_trait]
pub trait IStateRepository: Send + Sync {
    // --- Resumption token ---

    /// Returns the stored resumption token, if any
    async fn get_resumption_token(&self) -> anyhow::Result<Option<ResumptionToken>>;

    /// Inserts or replaces the single resumption token slot
    async fn save_or_update_token(&self, token: &ResumptionToken) -> anyhow::Result<()>;

    // --- Remote items ---

    /// Upserts a batch of remote items by id inside one transaction
    ///
    /// Items absent from the batch are left untouched.
    async fn apply_remote_items(&self, items: &[RemoteItem]) -> anyhow::Result<()>;

    /// Returns one page of download-eligible items, oldest `last_modified` first
    async fn get_pending_downloads(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> anyhow::Result<Vec<RemoteItem>>;

    /// Counts download-eligible items
    async fn get_pending_download_count(&self) -> anyhow::Result<u64>;

    /// Retrieves a remote item by id
    async fn get_remote_item(&self, id: &RemoteId) -> anyhow::Result<Option<RemoteItem>>;

    /// Retrieves the remote item at a path, preferring a live item over tombstones
    async fn get_remote_item_by_path(
        &self,
        path: &RelativePath,
    ) -> anyhow::Result<Option<RemoteItem>>;

    // --- Local files ---

    /// Upserts the local file sourced from the remote item `remote_id`
    ///
    /// The local file takes the remote id, path, size, hash and
    /// modification time. Stale rows at the same path with a different
    /// id are removed. Fails if the remote item is unknown.
    async fn mark_local_file_state(
        &self,
        remote_id: &RemoteId,
        state: SyncState,
    ) -> anyhow::Result<LocalFile>;

    /// Inserts or updates a local file by id
    async fn add_or_update_local_file(&self, file: &LocalFile) -> anyhow::Result<()>;

    /// Returns one page of local files in `PendingUpload`, oldest write first
    async fn get_pending_uploads(
        &self,
        page_size: u32,
        page_index: u32,
    ) -> anyhow::Result<Vec<LocalFile>>;

    /// Counts local files in `PendingUpload`
    async fn get_pending_upload_count(&self) -> anyhow::Result<u64>;

    /// Retrieves the local file at a path
    async fn get_local_file_by_path(&self, path: &RelativePath)
        -> anyhow::Result<Option<LocalFile>>;

    // --- Transfer logs ---

    /// Inserts or updates a transfer log by id
    async fn log_transfer(&self, log: &TransferLog) -> anyhow::Result<()>;

    /// Returns all transfer logs for an item, oldest first
    async fn get_transfer_logs(&self, item_id: &str) -> anyhow::Result<Vec<TransferLog>>;
}
