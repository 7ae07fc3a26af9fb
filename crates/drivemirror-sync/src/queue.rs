//! Bounded producer/consumer work queue
//!
//! A fixed-capacity `mpsc` channel drained by a fixed number of worker
//! tasks. The producer awaits in [`WorkQueue::push`] while the queue is
//! full, so pending work never grows beyond `capacity` items in memory.
//!
//! ## Design Notes
//!
//! - Workers share one receiver behind a `Mutex`; whichever worker is idle
//!   takes the next item.
//! - After cancellation workers stop taking new items. Items already being
//!   handled run to completion.
//! - [`WorkQueue::finish`] closes the queue and waits for the workers to
//!   drain what was already queued.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::SyncError;

/// Fixed-capacity queue with a fixed-size worker pool
pub struct WorkQueue<T> {
    sender: mpsc::Sender<T>,
    workers: JoinSet<()>,
    cancel: CancellationToken,
}

impl<T: Send + 'static> WorkQueue<T> {
    /// Starts `workers` tasks that each pass items to `handler`
    ///
    /// `capacity` and `workers` are clamped to at least one.
    pub fn spawn<H, Fut>(
        capacity: usize,
        workers: usize,
        cancel: CancellationToken,
        handler: H,
    ) -> Self
    where
        H: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let handler = Arc::new(handler);
        let mut set = JoinSet::new();

        for worker_id in 0..workers.max(1) {
            let receiver = Arc::clone(&receiver);
            let handler = Arc::clone(&handler);
            let cancel = cancel.clone();

            set.spawn(async move {
                loop {
                    let next = {
                        let mut rx = receiver.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            item = rx.recv() => item,
                        }
                    };

                    match next {
                        Some(item) => handler(item).await,
                        None => break,
                    }
                }
                trace!(worker_id, "Queue worker stopped");
            });
        }

        Self {
            sender,
            workers: set,
            cancel,
        }
    }

    /// Enqueues an item, waiting while the queue is full
    ///
    /// Returns [`SyncError::Cancelled`] once cancellation has fired; the
    /// item is dropped unprocessed.
    pub async fn push(&self, item: T) -> Result<(), SyncError> {
        if self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SyncError::Cancelled),
            sent = self.sender.send(item) => sent.map_err(|_| {
                SyncError::Other(anyhow::anyhow!("Work queue closed: all workers stopped"))
            }),
        }
    }

    /// Closes the queue and waits for every worker to exit
    pub async fn finish(self) -> Result<(), SyncError> {
        let Self {
            sender,
            mut workers,
            ..
        } = self;
        drop(sender);

        while let Some(joined) = workers.join_next().await {
            joined.map_err(|e| SyncError::Other(anyhow::anyhow!("Queue worker failed: {e}")))?;
        }
        Ok(())
    }
}
