//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the sync core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IRemoteClient`] - Delta feed, download and chunked upload
//! - [`IStateRepository`] - Persistent storage for sync state and transfer logs
//! - [`ILocalFileAccess`] - Local mirror enumeration and file I/O

pub mod local_file_access;
pub mod remote_client;
pub mod state_repository;

pub use local_file_access::{ILocalFileAccess, LocalFileInfo};
pub use remote_client::{ContentStream, DeltaItem, DeltaPage, IRemoteClient, UploadSession};
pub use state_repository::IStateRepository;
