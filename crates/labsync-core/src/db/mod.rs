//! Database layer for labsync

mod connection;
mod cursor_store;
mod migrations;
mod rows;

pub use connection::Database;
pub use cursor_store::{CursorStore, SqliteCursorStore};
pub use rows::{ExistingRow, SqliteEntityRows};
