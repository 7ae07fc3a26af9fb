//! Progress events and broadcast reporter
//!
//! Every current subscriber receives every event; late subscribers get no
//! replay. Consumers that fall behind by more than the channel capacity see
//! `RecvError::Lagged` and should sample or throttle on their side.

use tokio::sync::broadcast;
use tracing::trace;

use crate::engine::SyncPhase;

/// Default number of buffered events per subscriber
pub const DEFAULT_PROGRESS_CAPACITY: usize = 256;

/// One progress notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Engine phase at the time of the event
    pub phase: SyncPhase,
    /// Human-readable operation label, e.g. `"download"` or `"delta"`
    pub operation: String,
    /// Items completed so far in this operation
    pub processed: u64,
    /// Items known to be part of this operation
    pub total: u64,
    /// Download-eligible items remaining in the repository
    pub pending_downloads: u64,
    /// Upload-eligible items remaining in the repository
    pub pending_uploads: u64,
}

impl ProgressEvent {
    /// Creates an event with no pending counts
    pub fn new(phase: SyncPhase, operation: impl Into<String>, processed: u64, total: u64) -> Self {
        Self {
            phase,
            operation: operation.into(),
            processed,
            total,
            pending_downloads: 0,
            pending_uploads: 0,
        }
    }

    #[must_use]
    pub fn with_pending(self, pending_downloads: u64, pending_uploads: u64) -> Self {
        Self {
            pending_downloads,
            pending_uploads,
            ..self
        }
    }
}

/// Publishing side of the progress stream
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    sender: broadcast::Sender<ProgressEvent>,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(DEFAULT_PROGRESS_CAPACITY)
    }
}

impl ProgressReporter {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new subscriber that sees events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event; having no subscribers is not an error
    pub fn publish(&self, event: ProgressEvent) {
        trace!(
            phase = %event.phase,
            operation = %event.operation,
            processed = event.processed,
            total = event.total,
            "Progress"
        );
        let _ = self.sender.send(event);
    }
}
