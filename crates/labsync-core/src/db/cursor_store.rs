//! Sync cursor persistence
//!
//! Cursor writes are meant to run on the same connection (usually a
//! transaction) that applies the page they describe, so a crash can never
//! leave a cursor ahead of the data.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;
use crate::models::{SyncCursor, Watermark};
use crate::util::{format_storage_timestamp, parse_timestamp, utc_now};

/// Trait for per-table watermark storage
pub trait CursorStore {
    /// Current watermark; empty when the table was never synced or was reset
    fn read(&self, table: &str) -> Result<Watermark>;

    /// Create the cursor row if it does not exist yet
    fn ensure(&self, table: &str) -> Result<()>;

    /// Record the boundary of a freshly applied page
    fn advance(&self, table: &str, watermark: Watermark) -> Result<()>;

    /// Clear the watermark so the next pass restarts from the beginning
    fn reset(&self, table: &str) -> Result<()>;

    /// Get a cursor row by table name
    fn get(&self, table: &str) -> Result<Option<SyncCursor>>;

    /// All cursor rows, ordered by table name
    fn list(&self) -> Result<Vec<SyncCursor>>;
}

/// `SQLite` implementation of `CursorStore`
pub struct SqliteCursorStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteCursorStore<'a> {
    /// Create a new store with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_cursor(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncCursor> {
        let since: Option<String> = row.get(1)?;
        let created_at: String = row.get(3)?;
        let modified_at: String = row.get(4)?;
        let now = utc_now();
        Ok(SyncCursor {
            table_name: row.get(0)?,
            watermark: Watermark::new(since.as_deref().and_then(parse_timestamp), row.get(2)?),
            created_at: parse_timestamp(&created_at).unwrap_or(now),
            modified_at: parse_timestamp(&modified_at).unwrap_or(now),
        })
    }
}

impl CursorStore for SqliteCursorStore<'_> {
    fn read(&self, table: &str) -> Result<Watermark> {
        Ok(self
            .get(table)?
            .map(|cursor| cursor.watermark)
            .unwrap_or_default())
    }

    fn ensure(&self, table: &str) -> Result<()> {
        let now = format_storage_timestamp(&utc_now());
        self.conn.execute(
            "INSERT OR IGNORE INTO legacy_sync_state (legacy_table, since, since_pk, created_at, modified_at)
             VALUES (?, NULL, NULL, ?, ?)",
            params![table, now, now],
        )?;
        Ok(())
    }

    fn advance(&self, table: &str, watermark: Watermark) -> Result<()> {
        self.ensure(table)?;
        let now = format_storage_timestamp(&utc_now());
        self.conn.execute(
            "UPDATE legacy_sync_state SET since = ?, since_pk = ?, modified_at = ? WHERE legacy_table = ?",
            params![
                watermark.time.as_ref().map(format_storage_timestamp),
                watermark.pk,
                now,
                table
            ],
        )?;
        Ok(())
    }

    fn reset(&self, table: &str) -> Result<()> {
        self.advance(table, Watermark::default())
    }

    fn get(&self, table: &str) -> Result<Option<SyncCursor>> {
        let cursor = self
            .conn
            .query_row(
                "SELECT legacy_table, since, since_pk, created_at, modified_at
                 FROM legacy_sync_state WHERE legacy_table = ?",
                params![table],
                Self::parse_cursor,
            )
            .optional()?;
        Ok(cursor)
    }

    fn list(&self) -> Result<Vec<SyncCursor>> {
        let mut stmt = self.conn.prepare(
            "SELECT legacy_table, since, since_pk, created_at, modified_at
             FROM legacy_sync_state ORDER BY legacy_table",
        )?;
        let cursors = stmt
            .query_map([], Self::parse_cursor)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cursors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use chrono::NaiveDate;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn watermark(day: u32, pk: i64) -> Watermark {
        Watermark::new(
            NaiveDate::from_ymd_opt(2025, 12, day)
                .unwrap()
                .and_hms_opt(12, 0, 0),
            Some(pk),
        )
    }

    #[test]
    fn test_read_missing_cursor_is_empty() {
        let db = setup();
        let store = SqliteCursorStore::new(db.connection());
        assert!(store.read("iSPEC_Projects").unwrap().is_empty());
        assert!(store.get("iSPEC_Projects").unwrap().is_none());
    }

    #[test]
    fn test_ensure_creates_empty_row_once() {
        let db = setup();
        let store = SqliteCursorStore::new(db.connection());
        store.ensure("iSPEC_Projects").unwrap();
        store.ensure("iSPEC_Projects").unwrap();

        let cursors = store.list().unwrap();
        assert_eq!(cursors.len(), 1);
        assert!(cursors[0].watermark.is_empty());
    }

    #[test]
    fn test_advance_and_reset() {
        let db = setup();
        let store = SqliteCursorStore::new(db.connection());

        store.advance("iSPEC_People", watermark(5, 12)).unwrap();
        assert_eq!(store.read("iSPEC_People").unwrap(), watermark(5, 12));

        store.advance("iSPEC_People", watermark(6, 3)).unwrap();
        assert_eq!(store.read("iSPEC_People").unwrap(), watermark(6, 3));

        store.reset("iSPEC_People").unwrap();
        assert!(store.read("iSPEC_People").unwrap().is_empty());
        assert!(store.get("iSPEC_People").unwrap().is_some());
    }

    #[test]
    fn test_advance_rolls_back_with_transaction() {
        let db = setup();
        let tx = db.connection().unchecked_transaction().unwrap();
        SqliteCursorStore::new(&tx)
            .advance("iSPEC_Projects", watermark(5, 1))
            .unwrap();
        drop(tx);

        let store = SqliteCursorStore::new(db.connection());
        assert!(store.get("iSPEC_Projects").unwrap().is_none());
    }
}
