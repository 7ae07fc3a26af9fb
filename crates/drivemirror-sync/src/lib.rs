//! DriveMirror Sync - Delta synchronization and transfer core
//!
//! Provides:
//! - Delta feed enumeration with transactional page application
//! - Local file reconciliation against the last known remote state
//! - Bounded-concurrency downloads and chunked uploads with retry/backoff
//! - A broadcast progress stream
//!
//! ## Modules
//!
//! - [`delta`] - Delta page processor
//! - [`scanner`] - Local file scanner
//! - [`transfer`] - Transfer service (downloads and uploads)
//! - [`engine`] - Sync engine state machine orchestrating the above
//! - [`retry`] - Exponential backoff retry policy
//! - [`queue`] - Bounded producer/consumer work queue
//! - [`progress`] - Progress events and broadcast reporter
//! - [`filesystem`] - Local filesystem adapter (atomic writes, quickXorHash)

pub mod delta;
pub mod engine;
pub mod filesystem;
pub mod progress;
pub mod queue;
pub mod retry;
pub mod scanner;
pub mod transfer;

pub use delta::{DeltaOutcome, DeltaPageProcessor, PageOutcome};
pub use engine::{SyncEngine, SyncPhase, SyncSummary};
pub use filesystem::LocalFileAccessAdapter;
pub use progress::{ProgressEvent, ProgressReporter};
pub use queue::WorkQueue;
pub use retry::RetryPolicy;
pub use scanner::{LocalFileScanner, ScanOutcome};
pub use transfer::{TransferReport, TransferService, TransferSettings};

use thiserror::Error;

/// Errors that can occur during synchronization operations
#[derive(Debug, Error)]
pub enum SyncError {
    /// The operation observed the cancellation signal
    #[error("Operation cancelled")]
    Cancelled,

    /// Incremental sync was requested before any full sync stored a token
    #[error("No resumption token stored; run an initial full sync first")]
    NoResumptionToken,

    /// An I/O error occurred during file operations
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A domain-level error propagated from drivemirror-core
    #[error("Domain error: {0}")]
    DomainError(#[from] drivemirror_core::domain::DomainError),

    /// A failure reported by a port implementation
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SyncError {
    /// Returns true for the distinguished cancellation outcome
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}
