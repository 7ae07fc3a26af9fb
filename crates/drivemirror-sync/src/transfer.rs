//! Transfer service
//!
//! Pulls pending work from the state repository and moves bytes between
//! the remote drive and the local mirror.
//!
//! ## Flow
//!
//! 1. Query one batch of pending items (downloads or uploads)
//! 2. Push the batch into a bounded [`WorkQueue`]; workers run each item
//!    under a process-wide counting limiter
//! 3. Re-query until no unattempted item remains
//!
//! Per item, a [`TransferLog`] is written `InProgress` first and updated in
//! place on completion. A transfer failure (after retries) marks the log
//! `Failed` and leaves the item in its pre-transfer state, so the next run
//! rediscovers it. A persistence failure is fatal for the whole operation.
//!
//! ## Pagination
//!
//! Successful items drop out of the pending query, so the same page index
//! is re-queried after each batch. Failed items stay pending; a page made
//! only of items already attempted in this run advances the page index.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncReadExt;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use drivemirror_core::config::TransferConfig;
use drivemirror_core::domain::{
    newtypes::RelativePath, LocalFile, RemoteItem, SyncState, TransferKind, TransferLog,
};
use drivemirror_core::ports::{ILocalFileAccess, IRemoteClient, IStateRepository, LocalFileInfo};

use crate::engine::SyncPhase;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::queue::WorkQueue;
use crate::retry::RetryPolicy;
use crate::SyncError;

/// Upload ranges must be multiples of 320 KiB
pub const UPLOAD_CHUNK_SIZE: usize = 320 * 1024;

// ============================================================================
// Settings and report
// ============================================================================

/// Tunables for the transfer service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    /// Pending items fetched per repository query
    pub batch_size: u32,
    /// Maximum simultaneous transfers
    pub max_concurrency: usize,
    /// Items buffered between the batch producer and the workers
    pub queue_capacity: usize,
    /// Upload chunk size in bytes
    pub chunk_size: usize,
    pub retry: RetryPolicy,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_concurrency: 8,
            queue_capacity: 16,
            chunk_size: UPLOAD_CHUNK_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl TransferSettings {
    pub fn from_config(config: &TransferConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            queue_capacity: config.queue_capacity.max(1),
            chunk_size: config.chunk_size_bytes().max(1),
            retry: RetryPolicy::from_config(config),
        }
    }
}

/// Counters for one download or upload phase
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferReport {
    pub succeeded: u64,
    pub failed: u64,
    /// Bytes actually written locally (downloads) or sent (uploads)
    pub bytes: u64,
}

// ============================================================================
// Internal state
// ============================================================================

#[derive(Debug, Clone)]
enum TransferJob {
    Download(RemoteItem),
    Upload(LocalFile),
}

impl TransferJob {
    fn key(&self) -> String {
        match self {
            TransferJob::Download(item) => item.id.to_string(),
            TransferJob::Upload(file) => file.id.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobOutcome {
    Succeeded(u64),
    Failed,
    Cancelled,
}

/// Shared counters and control for one `process_pending_*` call
struct RunState {
    kind: TransferKind,
    total: u64,
    processed: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
    /// Child of the caller's token; also fired on a fatal error
    cancel: CancellationToken,
    fatal: Mutex<Option<SyncError>>,
}

impl RunState {
    fn new(kind: TransferKind, total: u64, cancel: CancellationToken) -> Self {
        Self {
            kind,
            total,
            processed: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            bytes: AtomicU64::new(0),
            cancel,
            fatal: Mutex::new(None),
        }
    }

    /// Records a finished item and returns the processed count
    fn record(&self, outcome: JobOutcome) -> u64 {
        match outcome {
            JobOutcome::Succeeded(bytes) => {
                self.succeeded.fetch_add(1, Ordering::SeqCst);
                self.bytes.fetch_add(bytes, Ordering::SeqCst);
            }
            JobOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            JobOutcome::Cancelled => return self.processed.load(Ordering::SeqCst),
        }
        self.processed.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Keeps the first fatal error and stops the run
    async fn abort(&self, err: SyncError) {
        let mut slot = self.fatal.lock().await;
        if slot.is_none() {
            *slot = Some(err);
        }
        self.cancel.cancel();
    }

    fn report(&self) -> TransferReport {
        TransferReport {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            bytes: self.bytes.load(Ordering::SeqCst),
        }
    }
}

struct TransferContext {
    remote: Arc<dyn IRemoteClient>,
    local: Arc<dyn ILocalFileAccess>,
    repository: Arc<dyn IStateRepository>,
    settings: TransferSettings,
    limiter: Semaphore,
    progress: ProgressReporter,
}

// ============================================================================
// TransferService
// ============================================================================

/// Executes pending downloads and uploads with bounded concurrency
pub struct TransferService {
    ctx: Arc<TransferContext>,
}

impl TransferService {
    pub fn new(
        remote: Arc<dyn IRemoteClient>,
        local: Arc<dyn ILocalFileAccess>,
        repository: Arc<dyn IStateRepository>,
        settings: TransferSettings,
        progress: ProgressReporter,
    ) -> Self {
        Self {
            ctx: Arc::new(TransferContext {
                remote,
                local,
                repository,
                limiter: Semaphore::new(settings.max_concurrency.max(1)),
                settings,
                progress,
            }),
        }
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.ctx.settings
    }

    /// Downloads every download-eligible remote item
    #[tracing::instrument(skip(self, cancel))]
    pub async fn process_pending_downloads(
        &self,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, SyncError> {
        self.process(TransferKind::Download, cancel).await
    }

    /// Uploads every local file in `PendingUpload`
    #[tracing::instrument(skip(self, cancel))]
    pub async fn process_pending_uploads(
        &self,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, SyncError> {
        self.process(TransferKind::Upload, cancel).await
    }

    async fn process(
        &self,
        kind: TransferKind,
        cancel: &CancellationToken,
    ) -> Result<TransferReport, SyncError> {
        let total = self.ctx.pending_count(kind).await?;
        info!(kind = %kind, total, "Processing pending transfers");

        let run = Arc::new(RunState::new(kind, total, cancel.child_token()));
        let mut attempted: HashSet<String> = HashSet::new();
        let mut page_index = 0u32;

        while !run.cancel.is_cancelled() {
            let page = self.ctx.fetch_page(kind, page_index).await?;
            if page.is_empty() {
                break;
            }

            let fresh: Vec<TransferJob> = page
                .into_iter()
                .filter(|job| attempted.insert(job.key()))
                .collect();
            if fresh.is_empty() {
                page_index += 1;
                continue;
            }

            debug!(kind = %kind, page_index, items = fresh.len(), "Dispatching batch");
            self.run_batch(fresh, &run).await?;
        }

        if let Some(err) = run.fatal.lock().await.take() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            info!(kind = %kind, "Transfer processing cancelled");
            return Err(SyncError::Cancelled);
        }

        let report = run.report();
        info!(
            kind = %kind,
            succeeded = report.succeeded,
            failed = report.failed,
            bytes = report.bytes,
            "Transfer processing complete"
        );
        Ok(report)
    }

    /// Runs one batch through a bounded queue and waits for it to drain
    async fn run_batch(&self, jobs: Vec<TransferJob>, run: &Arc<RunState>) -> Result<(), SyncError> {
        let ctx = Arc::clone(&self.ctx);
        let state = Arc::clone(run);
        let queue = WorkQueue::spawn(
            self.ctx.settings.queue_capacity,
            self.ctx.settings.max_concurrency,
            run.cancel.clone(),
            move |job: TransferJob| {
                let ctx = Arc::clone(&ctx);
                let state = Arc::clone(&state);
                async move { ctx.run_job(job, &state).await }
            },
        );

        for job in jobs {
            if queue.push(job).await.is_err() {
                break;
            }
        }
        queue.finish().await
    }
}

// ============================================================================
// Per-item work
// ============================================================================

impl TransferContext {
    async fn pending_count(&self, kind: TransferKind) -> Result<u64, SyncError> {
        let count = match kind {
            TransferKind::Upload => self.repository.get_pending_upload_count().await,
            _ => self.repository.get_pending_download_count().await,
        }
        .context("Failed to count pending transfers")?;
        Ok(count)
    }

    async fn fetch_page(
        &self,
        kind: TransferKind,
        page_index: u32,
    ) -> Result<Vec<TransferJob>, SyncError> {
        let batch = self.settings.batch_size;
        let jobs = match kind {
            TransferKind::Upload => self
                .repository
                .get_pending_uploads(batch, page_index)
                .await
                .context("Failed to query pending uploads")?
                .into_iter()
                .map(TransferJob::Upload)
                .collect(),
            _ => self
                .repository
                .get_pending_downloads(batch, page_index)
                .await
                .context("Failed to query pending downloads")?
                .into_iter()
                .map(TransferJob::Download)
                .collect(),
        };
        Ok(jobs)
    }

    async fn run_job(&self, job: TransferJob, run: &RunState) {
        let cancel = &run.cancel;
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            permit = self.limiter.acquire() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };
        if cancel.is_cancelled() {
            return;
        }

        let outcome = match &job {
            TransferJob::Download(item) => self.download(item, cancel).await,
            TransferJob::Upload(file) => self.upload(file, cancel).await,
        };

        match outcome {
            Ok(JobOutcome::Cancelled) => {}
            Ok(outcome) => {
                let processed = run.record(outcome);
                self.publish_progress(run, processed).await;
            }
            Err(err) => {
                error!(item = %job.key(), error = %format!("{err:#}"), "Fatal transfer error");
                run.abort(err).await;
            }
        }
    }

    async fn download(
        &self,
        item: &RemoteItem,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, SyncError> {
        let log = TransferLog::start(TransferKind::Download, item.id.as_str());
        self.record(&log).await?;
        debug!(id = %item.id, path = %item.path, "Downloading");

        let written = match self
            .settings
            .retry
            .run("download", cancel, move || async move {
                self.fetch_to_disk(item).await
            })
            .await
        {
            Ok(()) => self.stat(&item.path).await,
            Err(e) => Err(e),
        };

        // Record what actually landed on disk, not the remote size.
        let info = match written {
            Ok(info) => info,
            Err(SyncError::Cancelled) => {
                self.record(&log.reset_to_pending()).await?;
                return Ok(JobOutcome::Cancelled);
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(id = %item.id, error = %message, "Download failed");
                self.record(&log.failed(message)).await?;
                return Ok(JobOutcome::Failed);
            }
        };

        let marked = self
            .repository
            .mark_local_file_state(&item.id, SyncState::Downloaded)
            .await
            .with_context(|| format!("Failed to mark {} downloaded", item.id))?;
        let hash = info.hash.clone().or_else(|| marked.hash.clone());
        let file = marked
            .with_size(info.size)
            .with_last_write_time(info.last_write_time)
            .with_hash(hash);
        self.repository
            .add_or_update_local_file(&file)
            .await
            .with_context(|| format!("Failed to update local file {}", file.path))?;

        self.record(&log.succeeded(info.size)).await?;
        debug!(id = %item.id, bytes = info.size, "Download complete");
        Ok(JobOutcome::Succeeded(info.size))
    }

    async fn fetch_to_disk(&self, item: &RemoteItem) -> Result<(), SyncError> {
        let content = self
            .remote
            .download_content(&item.id)
            .await
            .with_context(|| format!("Failed to download {}", item.id))?;
        self.local
            .write_file(&item.path, content)
            .await
            .with_context(|| format!("Failed to write {}", item.path))?;
        Ok(())
    }

    async fn upload(
        &self,
        file: &LocalFile,
        cancel: &CancellationToken,
    ) -> Result<JobOutcome, SyncError> {
        let log = TransferLog::start(TransferKind::Upload, file.id.as_str());
        self.record(&log).await?;
        debug!(id = %file.id, path = %file.path, "Uploading");

        let info = match self.send_file(file, cancel).await {
            Ok(info) => info,
            Err(SyncError::Cancelled) => {
                self.record(&log.reset_to_pending()).await?;
                return Ok(JobOutcome::Cancelled);
            }
            Err(e) => {
                let message = format!("{e:#}");
                warn!(id = %file.id, error = %message, "Upload failed");
                self.record(&log.failed(message)).await?;
                return Ok(JobOutcome::Failed);
            }
        };

        let hash = info.hash.clone().or_else(|| file.hash.clone());
        let uploaded = file
            .clone()
            .with_size(info.size)
            .with_last_write_time(info.last_write_time)
            .with_hash(hash)
            .with_state(SyncState::Uploaded);
        self.repository
            .add_or_update_local_file(&uploaded)
            .await
            .with_context(|| format!("Failed to mark {} uploaded", file.path))?;

        self.record(&log.succeeded(info.size)).await?;
        debug!(id = %file.id, bytes = info.size, "Upload complete");
        Ok(JobOutcome::Succeeded(info.size))
    }

    /// Sends the file as sequential, contiguous chunks through one session
    ///
    /// Empty files go through a single simple upload instead, since a
    /// session never completes without a byte range.
    async fn send_file(
        &self,
        file: &LocalFile,
        cancel: &CancellationToken,
    ) -> Result<LocalFileInfo, SyncError> {
        let info = self.stat(&file.path).await?;
        let total = info.size;

        let parent = file.path.remote_parent();
        let parent = &parent;
        let name = file.path.file_name();

        if total == 0 {
            self.settings
                .retry
                .run("upload_small", cancel, move || async move {
                    self.remote
                        .upload_small(parent, name, &[])
                        .await
                        .map_err(SyncError::from)
                })
                .await?;
            return Ok(info);
        }
        let session = self
            .settings
            .retry
            .run("create_upload_session", cancel, move || async move {
                self.remote
                    .create_upload_session(parent, name)
                    .await
                    .map_err(SyncError::from)
            })
            .await?;
        let session = &session;

        let mut reader = self
            .local
            .open_read(&file.path)
            .await
            .with_context(|| format!("Failed to open {}", file.path))?
            .ok_or_else(|| anyhow::anyhow!("Local file {} no longer exists", file.path))?;

        let chunk_size = self.settings.chunk_size as u64;
        let mut buffer = vec![0u8; chunk_size.min(total) as usize];
        let mut offset = 0u64;

        while offset < total {
            let len = chunk_size.min(total - offset) as usize;
            reader
                .read_exact(&mut buffer[..len])
                .await
                .with_context(|| format!("Failed to read {} at offset {offset}", file.path))?;

            let chunk = &buffer[..len];
            let start = offset;
            let end = offset + len as u64 - 1;
            self.settings
                .retry
                .run("upload_chunk", cancel, move || async move {
                    self.remote
                        .upload_chunk(session, chunk, start, end, total)
                        .await
                        .map_err(SyncError::from)
                })
                .await?;

            offset += len as u64;
        }

        Ok(info)
    }

    async fn stat(&self, path: &RelativePath) -> Result<LocalFileInfo, SyncError> {
        let info = self
            .local
            .get_file_info(path)
            .await
            .with_context(|| format!("Failed to stat {path}"))?
            .ok_or_else(|| anyhow::anyhow!("Local file {path} is missing"))?;
        Ok(info)
    }

    async fn record(&self, log: &TransferLog) -> Result<(), SyncError> {
        self.repository
            .log_transfer(log)
            .await
            .with_context(|| format!("Failed to record transfer log {}", log.id))?;
        Ok(())
    }

    async fn publish_progress(&self, run: &RunState, processed: u64) {
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
            ProgressEvent::new(
                SyncPhase::TransferProcessing,
                run.kind.as_str(),
                processed,
                run.total,
            )
            .with_pending(pending_downloads, pending_uploads),
        );
    }
}
