//! Integration tests for drivemirror-sync
//!
//! Runs the delta processor, scanner, transfer service and engine against
//! a scripted remote, an in-memory mirror and an in-memory SQLite
//! repository.

mod common;

mod test_delta;
mod test_scanner;
