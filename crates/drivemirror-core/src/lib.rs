//! DriveMirror Core - Domain types and ports
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `RemoteItem`, `LocalFile`, `ResumptionToken`, `TransferLog`
//! - **Port definitions** - Traits for adapters: `IRemoteClient`, `IStateRepository`, `ILocalFileAccess`
//! - **Configuration** - YAML configuration with validation
//!
//! # Architecture
//!
//! The domain module contains plain values with no I/O.
//! Ports define trait interfaces that adapter crates implement.
//! The sync core in `drivemirror-sync` orchestrates domain values through ports.

pub mod config;
pub mod domain;
pub mod ports;
