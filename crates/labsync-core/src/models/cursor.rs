//! Sync cursor model

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Last boundary values the upstream reported for a table.
///
/// Comparison semantics belong to the legacy service; we only replay what it
/// told us.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Watermark {
    pub time: Option<NaiveDateTime>,
    pub pk: Option<i64>,
}

impl Watermark {
    pub const fn new(time: Option<NaiveDateTime>, pk: Option<i64>) -> Self {
        Self { time, pk }
    }

    /// No boundary yet: the next pass starts from the beginning.
    pub const fn is_empty(&self) -> bool {
        self.time.is_none() && self.pk.is_none()
    }

    /// Take each missing component from `fallback`.
    #[must_use]
    pub fn or(self, fallback: Self) -> Self {
        Self {
            time: self.time.or(fallback.time),
            pk: self.pk.or(fallback.pk),
        }
    }
}

/// Persisted cursor row for one remote table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Remote table name (primary key)
    pub table_name: String,
    /// Current watermark
    pub watermark: Watermark,
    /// When the cursor row was first created
    pub created_at: NaiveDateTime,
    /// When the cursor row last changed
    pub modified_at: NaiveDateTime,
}
