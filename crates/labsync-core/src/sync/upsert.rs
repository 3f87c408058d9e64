//! Conflict-aware application of materialized records.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use super::ownership::{classify_ownership, Ownership, OwnershipFacts};
use crate::db::{ExistingRow, SqliteEntityRows};
use crate::error::{Error, Result};
use crate::models::{FieldValue, MaterializedRecord, SYNC_MARKER};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Backfilled,
    Conflicted,
}

/// Applies records on one connection (normally the page transaction).
pub struct UpsertEngine<'a> {
    rows: SqliteEntityRows<'a>,
    backfill_missing: bool,
    now: NaiveDateTime,
}

impl<'a> UpsertEngine<'a> {
    pub const fn new(conn: &'a Connection, backfill_missing: bool, now: NaiveDateTime) -> Self {
        Self {
            rows: SqliteEntityRows::new(conn),
            backfill_missing,
            now,
        }
    }

    pub fn apply(&self, record: &MaterializedRecord) -> Result<UpsertOutcome> {
        let key = record.local_key().ok_or_else(|| {
            Error::InvalidInput(format!(
                "{} record {} has no complete local key",
                record.entity, record.remote_pk
            ))
        })?;

        let Some(existing) = self.rows.find(record.entity, &key)? else {
            self.insert(record)?;
            return Ok(UpsertOutcome::Inserted);
        };

        match classify_ownership(&OwnershipFacts::from_row(&existing)) {
            Ownership::SyncOwned => {
                let mut fields = record.fields.clone();
                fields.remove("id");
                fields.insert("imported_at", FieldValue::Timestamp(self.now));
                self.rows.update(record.entity, existing.id, &fields)?;
                Ok(UpsertOutcome::Updated)
            }
            Ownership::UserOwned if !self.backfill_missing => Ok(UpsertOutcome::Conflicted),
            Ownership::UserOwned => {
                let changes = backfill_changes(record, &existing);
                if changes.is_empty() {
                    return Ok(UpsertOutcome::Conflicted);
                }
                tracing::debug!(
                    entity = %record.entity,
                    id = existing.id,
                    columns = changes.len(),
                    "Backfilled empty local columns"
                );
                self.rows.update(record.entity, existing.id, &changes)?;
                Ok(UpsertOutcome::Backfilled)
            }
        }
    }

    fn insert(&self, record: &MaterializedRecord) -> Result<i64> {
        let mut fields = record.fields.clone();
        if record.entity.has_surrogate_id() {
            fields.remove("id");
        }
        for column in ["created_at", "modified_at"] {
            if fields.get(column).map_or(true, FieldValue::is_blank) {
                fields.insert(column, FieldValue::Timestamp(self.now));
            }
        }
        fields.insert("imported_at", FieldValue::Timestamp(self.now));
        self.rows.insert(record.entity, &fields)
    }
}

/// Incoming values for columns that are empty locally.
fn backfill_changes(
    record: &MaterializedRecord,
    existing: &ExistingRow,
) -> BTreeMap<&'static str, FieldValue> {
    let key_columns = record.entity.key_columns();
    record
        .fields
        .iter()
        .filter(|(column, _)| !key_columns.contains(*column) && **column != "imported_at")
        .filter(|(_, incoming)| !incoming.is_blank())
        .filter(|(column, incoming)| {
            let local = existing.get(column);
            let missing = match local {
                None => true,
                Some(value) if value.is_blank() => true,
                Some(FieldValue::Text(text)) => **column == "added_by" && text == SYNC_MARKER,
                Some(_) => false,
            };
            missing && local != Some(*incoming)
        })
        .map(|(column, incoming)| (*column, incoming.clone()))
        .collect()
}
