//! labsync-core - Core library for labsync
//!
//! This crate contains the local store, the declarative field mapping, and the
//! incremental legacy sync engine used by the `labsync` CLI and any other host
//! that schedules sync passes.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{EntityKind, SyncCursor};
pub use sync::{SyncAllSummary, SyncSummary};
