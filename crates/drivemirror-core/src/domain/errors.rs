//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures of identifiers, paths and tokens.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid relative path format or content
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Invalid hash format (expected Base64 text)
    #[error("Invalid hash format: {0}")]
    InvalidHash(String),

    /// Invalid remote path format
    #[error("Invalid remote path: {0}")]
    InvalidRemotePath(String),

    /// Invalid remote ID format
    #[error("Invalid remote ID: {0}")]
    InvalidRemoteId(String),

    /// Invalid delta token
    #[error("Invalid delta token: {0}")]
    InvalidDeltaToken(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}
