//! Column-driven access to synchronized entity tables

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::error::{Error, Result};
use crate::models::{EntityKind, FieldValue, LocalKey};

/// A local row as currently stored
#[derive(Debug, Clone, PartialEq)]
pub struct ExistingRow {
    pub id: i64,
    pub values: BTreeMap<&'static str, FieldValue>,
}

impl ExistingRow {
    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.values.get(column)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FieldValue::as_text)
    }

    pub fn timestamp(&self, column: &str) -> Option<NaiveDateTime> {
        self.get(column).and_then(FieldValue::as_timestamp)
    }
}

/// `SQLite` row access for every [`EntityKind`]
pub struct SqliteEntityRows<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteEntityRows<'a> {
    /// Create a new accessor with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn select_list(entity: EntityKind) -> String {
        entity
            .columns()
            .iter()
            .map(|column| column.name)
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn parse_row(entity: EntityKind, row: &rusqlite::Row<'_>) -> rusqlite::Result<ExistingRow> {
        let mut values = BTreeMap::new();
        for (index, column) in entity.columns().iter().enumerate() {
            let raw = row.get_ref(index)?;
            values.insert(column.name, FieldValue::from_column(column.kind, raw));
        }
        let id = values
            .get("id")
            .and_then(FieldValue::as_integer)
            .unwrap_or_default();
        Ok(ExistingRow { id, values })
    }

    /// Find the row matching a local key
    pub fn find(&self, entity: EntityKind, key: &LocalKey) -> Result<Option<ExistingRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            Self::select_list(entity),
            entity.table(),
            key.where_clause()
        );
        let row = self
            .conn
            .query_row(&sql, params_from_iter(key.values()), |row| {
                Self::parse_row(entity, row)
            })
            .optional()?;
        Ok(row)
    }

    /// Get a row by local id
    pub fn get(&self, entity: EntityKind, id: i64) -> Result<Option<ExistingRow>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?",
            Self::select_list(entity),
            entity.table()
        );
        let row = self
            .conn
            .query_row(&sql, params![id], |row| Self::parse_row(entity, row))
            .optional()?;
        Ok(row)
    }

    pub fn exists(&self, entity: EntityKind, id: i64) -> Result<bool> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)",
            entity.table()
        );
        Ok(self.conn.query_row(&sql, params![id], |row| row.get(0))?)
    }

    pub fn count(&self, entity: EntityKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", entity.table());
        Ok(self.conn.query_row(&sql, [], |row| row.get(0))?)
    }

    /// Insert a row and return its local id
    pub fn insert(
        &self,
        entity: EntityKind,
        fields: &BTreeMap<&'static str, FieldValue>,
    ) -> Result<i64> {
        if fields.is_empty() {
            return Err(Error::InvalidInput(format!(
                "refusing to insert an empty {} row",
                entity.table()
            )));
        }

        let columns = fields.keys().copied().collect::<Vec<_>>();
        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({placeholders})",
            entity.table(),
            columns.join(", ")
        );
        self.conn.execute(&sql, params_from_iter(fields.values()))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Overwrite the given columns of one row
    pub fn update(
        &self,
        entity: EntityKind,
        id: i64,
        fields: &BTreeMap<&'static str, FieldValue>,
    ) -> Result<()> {
        let assignments = fields
            .keys()
            .filter(|column| **column != "id")
            .map(|column| format!("{column} = ?"))
            .collect::<Vec<_>>();
        if assignments.is_empty() {
            return Ok(());
        }

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?",
            entity.table(),
            assignments.join(", ")
        );
        let id_value = FieldValue::Integer(id);
        let values = fields
            .iter()
            .filter(|(column, _)| **column != "id")
            .map(|(_, value)| value)
            .chain(std::iter::once(&id_value));
        self.conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::util::utc_now;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn project_fields(id: i64, title: &str) -> BTreeMap<&'static str, FieldValue> {
        let now = utc_now();
        BTreeMap::from([
            ("id", FieldValue::Integer(id)),
            ("added_by", FieldValue::Text("user".to_string())),
            ("title", FieldValue::Text(title.to_string())),
            ("created_at", FieldValue::Timestamp(now)),
            ("modified_at", FieldValue::Timestamp(now)),
        ])
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup();
        let rows = SqliteEntityRows::new(db.connection());

        let id = rows
            .insert(EntityKind::Projects, &project_fields(7, "Seven"))
            .unwrap();
        assert_eq!(id, 7);

        let row = rows.get(EntityKind::Projects, 7).unwrap().unwrap();
        assert_eq!(row.text("title"), Some("Seven"));
        assert_eq!(row.get("r_and_d"), Some(&FieldValue::Bool(false)));
        assert_eq!(row.get("imported_at"), Some(&FieldValue::Null));
        assert!(row.timestamp("created_at").is_some());
        assert!(rows.exists(EntityKind::Projects, 7).unwrap());
        assert!(!rows.exists(EntityKind::Projects, 8).unwrap());
    }

    #[test]
    fn test_update_overwrites_only_given_columns() {
        let db = setup();
        let rows = SqliteEntityRows::new(db.connection());
        rows.insert(EntityKind::Projects, &project_fields(1, "Old"))
            .unwrap();

        let changes = BTreeMap::from([("status", FieldValue::Text("closed".to_string()))]);
        rows.update(EntityKind::Projects, 1, &changes).unwrap();

        let row = rows.get(EntityKind::Projects, 1).unwrap().unwrap();
        assert_eq!(row.text("title"), Some("Old"));
        assert_eq!(row.text("status"), Some("closed"));
    }

    #[test]
    fn test_find_by_composite_key() {
        let db = setup();
        let rows = SqliteEntityRows::new(db.connection());
        rows.insert(EntityKind::Projects, &project_fields(1, "P"))
            .unwrap();
        let now = utc_now();
        rows.insert(
            EntityKind::Experiments,
            &BTreeMap::from([
                ("id", FieldValue::Integer(10)),
                ("project_id", FieldValue::Integer(1)),
                ("record_no", FieldValue::Text("10".to_string())),
                ("created_at", FieldValue::Timestamp(now)),
                ("modified_at", FieldValue::Timestamp(now)),
            ]),
        )
        .unwrap();
        let run_id = rows
            .insert(
                EntityKind::ExperimentRuns,
                &BTreeMap::from([
                    ("experiment_id", FieldValue::Integer(10)),
                    ("run_no", FieldValue::Integer(1)),
                    ("search_no", FieldValue::Integer(2)),
                    ("created_at", FieldValue::Timestamp(now)),
                    ("modified_at", FieldValue::Timestamp(now)),
                ]),
            )
            .unwrap();

        let key = LocalKey {
            parts: vec![
                ("experiment_id", FieldValue::Integer(10)),
                ("run_no", FieldValue::Integer(1)),
                ("search_no", FieldValue::Integer(2)),
            ],
        };
        let found = rows.find(EntityKind::ExperimentRuns, &key).unwrap().unwrap();
        assert_eq!(found.id, run_id);

        let other = LocalKey {
            parts: vec![
                ("experiment_id", FieldValue::Integer(10)),
                ("run_no", FieldValue::Integer(1)),
                ("search_no", FieldValue::Integer(3)),
            ],
        };
        assert!(rows.find(EntityKind::ExperimentRuns, &other).unwrap().is_none());
    }
}
