//! Sync engine
//!
//! The [`SyncEngine`] drives one synchronization pass at a time through the
//! delta page processor, the local file scanner and the transfer service.
//!
//! ## Sync Flow
//!
//! 1. **Delta enumeration**: apply remote changes to the repository and
//!    store the resumption token
//! 2. **Transfer processing**: upload pending local files, then download
//!    pending remote items. Uploading first moves edited files to
//!    `Uploaded`, which keeps a pending download of the same item from
//!    overwriting the edit.
//! 3. **Completion**: publish the final phase and return a summary
//!
//! ```text
//! Idle -> DeltaEnumeration -> TransferProcessing -> Completed
//!               \                     \
//!                +--> Cancelled / Failed <--+
//! ```
//!
//! A local scan only marks files for upload; it does not move the phase.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use drivemirror_core::domain::ResumptionToken;
use drivemirror_core::ports::{ILocalFileAccess, IRemoteClient, IStateRepository};

use crate::delta::DeltaPageProcessor;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::scanner::{LocalFileScanner, ScanOutcome};
use crate::transfer::{TransferReport, TransferService, TransferSettings};
use crate::SyncError;

// ============================================================================
// SyncPhase
// ============================================================================

/// Position of the engine in its state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SyncPhase {
    #[default]
    Idle,
    DeltaEnumeration,
    TransferProcessing,
    Completed,
    Cancelled,
    Failed,
}

impl SyncPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPhase::Idle => "idle",
            SyncPhase::DeltaEnumeration => "delta_enumeration",
            SyncPhase::TransferProcessing => "transfer_processing",
            SyncPhase::Completed => "completed",
            SyncPhase::Cancelled => "cancelled",
            SyncPhase::Failed => "failed",
        }
    }

    /// Returns true once a pass has ended, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncPhase::Completed | SyncPhase::Cancelled | SyncPhase::Failed
        )
    }
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SyncSummary
// ============================================================================

/// What one engine operation did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Phase the operation ended in
    pub phase: SyncPhase,
    pub delta_pages: u32,
    pub delta_items: u64,
    /// Whether a resumption token was written
    pub token_saved: bool,
    /// Incremental sync only: the feed reported more pages
    pub has_more: bool,
    pub downloads: TransferReport,
    pub uploads: TransferReport,
    /// Present for a local scan
    pub scan: Option<ScanOutcome>,
}

// ============================================================================
// SyncEngine
// ============================================================================

/// Orchestrates full sync, incremental sync and local scans
pub struct SyncEngine {
    repository: Arc<dyn IStateRepository>,
    delta: DeltaPageProcessor,
    scanner: LocalFileScanner,
    transfers: TransferService,
    progress: ProgressReporter,
    phase: watch::Sender<SyncPhase>,
    /// Serializes operations; one pass runs at a time
    running: Mutex<()>,
}

impl SyncEngine {
    pub fn new(
        remote: Arc<dyn IRemoteClient>,
        local: Arc<dyn ILocalFileAccess>,
        repository: Arc<dyn IStateRepository>,
        settings: TransferSettings,
    ) -> Self {
        Self::with_progress(remote, local, repository, settings, ProgressReporter::default())
    }

    /// Creates an engine that publishes on an existing reporter
    pub fn with_progress(
        remote: Arc<dyn IRemoteClient>,
        local: Arc<dyn ILocalFileAccess>,
        repository: Arc<dyn IStateRepository>,
        settings: TransferSettings,
        progress: ProgressReporter,
    ) -> Self {
        let (phase, _) = watch::channel(SyncPhase::Idle);

        Self {
            delta: DeltaPageProcessor::new(Arc::clone(&remote), Arc::clone(&repository)),
            scanner: LocalFileScanner::new(Arc::clone(&local), Arc::clone(&repository)),
            transfers: TransferService::new(
                remote,
                local,
                Arc::clone(&repository),
                settings,
                progress.clone(),
            ),
            repository,
            progress,
            phase,
            running: Mutex::new(()),
        }
    }

    /// Current phase
    pub fn phase(&self) -> SyncPhase {
        *self.phase.borrow()
    }

    /// Receiver that observes every phase change
    pub fn watch_phase(&self) -> watch::Receiver<SyncPhase> {
        self.phase.subscribe()
    }

    pub fn subscribe_progress(&self) -> broadcast::Receiver<ProgressEvent> {
        self.progress.subscribe()
    }

    /// Enumerates the whole remote drive, stores the token, then transfers
    #[tracing::instrument(skip(self, cancel))]
    pub async fn initial_full_sync(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, SyncError> {
        let _running = self.running.lock().await;
        info!("Starting initial full sync");

        let result = self.run_full(cancel).await;
        self.conclude("full sync", result).await
    }

    /// Applies one delta page from the stored token, then transfers
    ///
    /// Fails with [`SyncError::NoResumptionToken`] before touching the
    /// remote when no full sync has stored a token yet.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn incremental_sync(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, SyncError> {
        let _running = self.running.lock().await;

        let stored = self
            .repository
            .get_resumption_token()
            .await
            .context("Failed to read resumption token")?
            .ok_or(SyncError::NoResumptionToken)?;
        info!(last_synced_at = %stored.last_synced_at, "Starting incremental sync");

        let result = self.run_incremental(stored, cancel).await;
        self.conclude("incremental sync", result).await
    }

    /// Marks new and modified local files for upload
    ///
    /// No transfers are started; the next sync pass uploads what was marked.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn scan_local_files(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, SyncError> {
        let _running = self.running.lock().await;

        let scan = self.scanner.scan(cancel).await?;
        self.publish(SyncPhase::Completed, "scan", scan.processed, scan.processed)
            .await;

        Ok(SyncSummary {
            phase: SyncPhase::Completed,
            scan: Some(scan),
            ..SyncSummary::default()
        })
    }

    async fn run_full(&self, cancel: &CancellationToken) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();

        self.enter(SyncPhase::DeltaEnumeration);
        self.publish(SyncPhase::DeltaEnumeration, "delta", 0, 0).await;

        let delta = self.delta.process_all_pages(None, cancel).await?;
        summary.delta_pages = delta.page_count;
        summary.delta_items = delta.total_items;

        if let Some(token) = delta.final_token {
            self.repository
                .save_or_update_token(&ResumptionToken::new(token))
                .await
                .context("Failed to save resumption token")?;
            summary.token_saved = true;
        }
        self.publish(
            SyncPhase::DeltaEnumeration,
            "delta",
            u64::from(delta.page_count),
            u64::from(delta.page_count),
        )
        .await;

        self.transfer(&mut summary, cancel).await?;
        Ok(summary)
    }

    async fn run_incremental(
        &self,
        stored: ResumptionToken,
        cancel: &CancellationToken,
    ) -> Result<SyncSummary, SyncError> {
        let mut summary = SyncSummary::default();

        self.enter(SyncPhase::DeltaEnumeration);
        self.publish(SyncPhase::DeltaEnumeration, "delta", 0, 1).await;

        let page = self.delta.process_single_page(&stored.token, cancel).await?;
        summary.delta_pages = 1;
        summary.delta_items = page.items;
        summary.has_more = page.has_more;

        if let Some(token) = page.token {
            self.repository
                .save_or_update_token(&stored.with_token(token))
                .await
                .context("Failed to update resumption token")?;
            summary.token_saved = true;
        }
        self.publish(SyncPhase::DeltaEnumeration, "delta", 1, 1).await;

        self.transfer(&mut summary, cancel).await?;
        Ok(summary)
    }

    async fn transfer(
        &self,
        summary: &mut SyncSummary,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        self.enter(SyncPhase::TransferProcessing);
        self.publish(SyncPhase::TransferProcessing, "transfer", 0, 0).await;

        summary.uploads = self.transfers.process_pending_uploads(cancel).await?;
        summary.downloads = self.transfers.process_pending_downloads(cancel).await?;
        Ok(())
    }

    /// Maps the pass result onto a terminal phase
    async fn conclude(
        &self,
        operation: &str,
        result: Result<SyncSummary, SyncError>,
    ) -> Result<SyncSummary, SyncError> {
        match result {
            Ok(mut summary) => {
                summary.phase = SyncPhase::Completed;
                self.enter(SyncPhase::Completed);
                self.publish(SyncPhase::Completed, operation, 1, 1).await;
                info!(
                    operation,
                    delta_pages = summary.delta_pages,
                    delta_items = summary.delta_items,
                    downloaded = summary.downloads.succeeded,
                    download_failures = summary.downloads.failed,
                    uploaded = summary.uploads.succeeded,
                    upload_failures = summary.uploads.failed,
                    "Sync pass completed"
                );
                Ok(summary)
            }
            Err(SyncError::Cancelled) => {
                self.enter(SyncPhase::Cancelled);
                self.publish(SyncPhase::Cancelled, operation, 0, 0).await;
                info!(operation, "Sync pass cancelled");
                Err(SyncError::Cancelled)
            }
            Err(e) => {
                self.enter(SyncPhase::Failed);
                self.publish(SyncPhase::Failed, operation, 0, 0).await;
                error!(operation, error = %format!("{e:#}"), "Sync pass failed");
                Err(e)
            }
        }
    }

    fn enter(&self, phase: SyncPhase) {
        self.phase.send_replace(phase);
    }

    /// Publishes a boundary event with the current pending counts
    async fn publish(&self, phase: SyncPhase, operation: &str, processed: u64, total: u64) {
        if self.progress.subscriber_count() == 0 {
            return;
        }

        let pending_downloads = self
            .repository
            .get_pending_download_count()
            .await
            .unwrap_or_default();
        let pending_uploads = self
            .repository
            .get_pending_upload_count()
            .await
            .unwrap_or_default();

        self.progress.publish(
            ProgressEvent::new(phase, operation, processed, total)
                .with_pending(pending_downloads, pending_uploads),
        );
    }
}
