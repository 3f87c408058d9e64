//! Data models for labsync

mod cursor;
mod entity;
mod record;
mod value;

pub use cursor::{SyncCursor, Watermark};
pub use entity::{ColumnKind, ColumnSpec, EntityKind, SYNC_MARKER, SYSTEM_PERSON_ID};
pub use record::{LocalKey, MaterializedRecord};
pub use value::FieldValue;
