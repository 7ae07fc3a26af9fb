//! Transfer log entries
//!
//! One `TransferLog` row exists per transfer attempt. It is written as
//! `InProgress` when the attempt starts and updated in place when the
//! attempt completes, so retries inside one attempt never duplicate rows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::TransferId;

/// Kind of transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    Download,
    Upload,
    Delete,
}

impl TransferKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferKind::Download => "download",
            TransferKind::Upload => "upload",
            TransferKind::Delete => "delete",
        }
    }
}

impl fmt::Display for TransferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome status of a transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    InProgress,
    Success,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::InProgress => "in_progress",
            TransferStatus::Success => "success",
            TransferStatus::Failed => "failed",
        }
    }

    /// Returns true for Success and Failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Success | TransferStatus::Failed)
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single transfer attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLog {
    pub id: TransferId,
    pub kind: TransferKind,
    /// Id of the remote item or local file being transferred
    pub item_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: TransferStatus,
    pub bytes_transferred: u64,
    pub error: Option<String>,
}

impl TransferLog {
    /// Starts a new attempt in the `InProgress` state
    pub fn start(kind: TransferKind, item_id: impl Into<String>) -> Self {
        Self {
            id: TransferId::new(),
            kind,
            item_id: item_id.into(),
            started_at: Utc::now(),
            completed_at: None,
            status: TransferStatus::InProgress,
            bytes_transferred: 0,
            error: None,
        }
    }

    /// Completes the attempt successfully
    #[must_use]
    pub fn succeeded(self, bytes_transferred: u64) -> Self {
        Self {
            completed_at: Some(Utc::now()),
            status: TransferStatus::Success,
            bytes_transferred,
            error: None,
            ..self
        }
    }

    /// Completes the attempt with a failure; no bytes are counted
    #[must_use]
    pub fn failed(self, message: impl Into<String>) -> Self {
        Self {
            completed_at: Some(Utc::now()),
            status: TransferStatus::Failed,
            bytes_transferred: 0,
            error: Some(message.into()),
            ..self
        }
    }

    /// Puts an interrupted attempt back to `Pending`
    #[must_use]
    pub fn reset_to_pending(self) -> Self {
        Self {
            completed_at: None,
            status: TransferStatus::Pending,
            bytes_transferred: 0,
            error: None,
            ..self
        }
    }
}
