//! Stand-in parent rows for children that arrive before their parents.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rusqlite::Connection;

use super::coerce::{project_display_id, untitled_project_title};
use crate::db::SqliteEntityRows;
use crate::error::{Error, Result};
use crate::models::{EntityKind, FieldValue, MaterializedRecord, SYNC_MARKER, SYSTEM_PERSON_ID};

pub struct PlaceholderResolver<'a> {
    rows: SqliteEntityRows<'a>,
    now: NaiveDateTime,
}

impl<'a> PlaceholderResolver<'a> {
    pub const fn new(conn: &'a Connection, now: NaiveDateTime) -> Self {
        Self {
            rows: SqliteEntityRows::new(conn),
            now,
        }
    }

    /// Create every missing parent the record refers to. Returns how many
    /// rows were created.
    pub fn ensure_parents(&self, record: &MaterializedRecord) -> Result<usize> {
        let mut created = 0;
        for (column, parent) in record.entity.parents() {
            if let Some(id) = record.integer(column) {
                if self.ensure(*parent, id)? {
                    created += 1;
                }
            }
        }
        Ok(created)
    }

    /// Create a placeholder `entity` row with `id` unless one exists.
    pub fn ensure(&self, entity: EntityKind, id: i64) -> Result<bool> {
        if self.rows.exists(entity, id)? {
            return Ok(false);
        }
        let fields = placeholder_fields(entity, id, self.now)?;
        self.rows.insert(entity, &fields)?;
        tracing::debug!(%entity, id, "Created placeholder row");
        Ok(true)
    }
}

fn placeholder_fields(
    entity: EntityKind,
    id: i64,
    now: NaiveDateTime,
) -> Result<BTreeMap<&'static str, FieldValue>> {
    let mut fields = BTreeMap::from([
        ("id", FieldValue::Integer(id)),
        ("added_by", FieldValue::Text(SYNC_MARKER.to_string())),
        ("created_at", FieldValue::Timestamp(now)),
        ("modified_at", FieldValue::Timestamp(now)),
    ]);

    match entity {
        EntityKind::Projects => {
            let title = untitled_project_title(id);
            let display_id = project_display_id(id);
            fields.insert("display_title", FieldValue::Text(format!("{display_id} - {title}")));
            fields.insert("title", FieldValue::Text(title));
            fields.insert("display_id", FieldValue::Text(display_id));
        }
        EntityKind::People => {
            let (first, last) = if id == SYSTEM_PERSON_ID {
                ("System".to_string(), "System".to_string())
            } else {
                ("Legacy".to_string(), format!("Person {id}"))
            };
            fields.insert("first_name", FieldValue::Text(first));
            fields.insert("last_name", FieldValue::Text(last));
        }
        EntityKind::Experiments => {
            fields.insert("record_no", FieldValue::Text(id.to_string()));
            fields.insert("project_id", FieldValue::Null);
        }
        EntityKind::ExperimentRuns | EntityKind::ProjectComments => {
            return Err(Error::InvalidInput(format!(
                "{entity} rows are never referenced as parents"
            )));
        }
    }
    Ok(fields)
}
