//! DriveMirror Graph - Microsoft Graph drive adapter
//!
//! Implements the `IRemoteClient` port against a Graph style drive API:
//! - Paginated delta queries
//! - Streamed content download
//! - Resumable upload sessions with `Content-Range` chunks
//!
//! ## Modules
//!
//! - [`client`] - Authenticated HTTP client and status classification
//! - [`delta`] - Delta page requests and item parsing
//! - [`upload`] - Upload session creation and chunk transfer
//! - [`provider`] - [`GraphRemoteClient`], the port implementation
//!
//! Access tokens are acquired elsewhere; the client only attaches them.

pub mod client;
pub mod delta;
pub mod provider;
pub mod upload;

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

pub use client::GraphClient;
pub use provider::GraphRemoteClient;

/// Errors that can occur when communicating with the Microsoft Graph API
#[derive(Debug, Error)]
pub enum GraphError {
    /// Authentication credentials are invalid or expired
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Insufficient permissions for the requested operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The requested resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A conflict was detected (e.g., concurrent modification)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The delta token is no longer valid; a full enumeration is required
    #[error("Resync required: {0}")]
    ResyncRequired(String),

    /// Rate limit exceeded; retry after the specified duration
    #[error("Too many requests, retry after {retry_after:?}")]
    TooManyRequests {
        /// Duration to wait before retrying
        retry_after: Duration,
    },

    /// A server-side error occurred (5xx)
    #[error("Server error ({status}): {message}")]
    ServerError {
        status: u16,
        message: String,
        /// Present when the server sent a `Retry-After` header
        retry_after: Option<Duration>,
    },

    /// Any other non-success status
    #[error("Unexpected status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },

    /// A network-level error occurred
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// The request could not be built from the given arguments
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The API response could not be parsed or was malformed
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl GraphError {
    /// Classifies a non-success HTTP status
    pub fn from_status(status: StatusCode, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            StatusCode::UNAUTHORIZED => GraphError::Unauthorized(message),
            StatusCode::FORBIDDEN => GraphError::Forbidden(message),
            StatusCode::NOT_FOUND => GraphError::NotFound(message),
            StatusCode::CONFLICT => GraphError::Conflict(message),
            StatusCode::GONE => GraphError::ResyncRequired(message),
            StatusCode::TOO_MANY_REQUESTS => GraphError::TooManyRequests {
                retry_after: retry_after.unwrap_or(client::DEFAULT_RETRY_AFTER),
            },
            s if s.is_server_error() => GraphError::ServerError {
                status: s.as_u16(),
                message,
                retry_after,
            },
            s => GraphError::UnexpectedStatus {
                status: s.as_u16(),
                message,
            },
        }
    }

    /// Server-requested wait before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GraphError::TooManyRequests { retry_after } => Some(*retry_after),
            GraphError::ServerError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns true for failures that a later attempt may not repeat
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GraphError::TooManyRequests { .. }
                | GraphError::ServerError { .. }
                | GraphError::NetworkError(_)
        )
    }
}
