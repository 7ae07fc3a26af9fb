//! Domain entities and business logic
//!
//! This module contains the core domain types for DriveMirror:
//! - Newtypes for type-safe identifiers and validated paths
//! - Remote item and local file snapshots
//! - The resumption token slot
//! - Transfer log entries
//! - Stored timestamp precision
//! - Domain-specific error types

pub mod errors;
pub mod local_file;
pub mod newtypes;
pub mod remote_item;
pub mod resumption;
pub mod timestamp;
pub mod transfer_log;

// Re-export commonly used types
pub use errors::DomainError;
pub use local_file::{LocalFile, SyncState};
pub use newtypes::*;
pub use remote_item::RemoteItem;
pub use resumption::ResumptionToken;
pub use timestamp::to_stored_precision;
pub use transfer_log::{TransferKind, TransferLog, TransferStatus};
