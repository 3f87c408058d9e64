//! Materialized record model

use std::collections::BTreeMap;

use super::entity::EntityKind;
use super::value::FieldValue;

/// A remote row after mapping and type coercion.
///
/// Fields absent from the remote row are absent here too; a present field may
/// still hold [`FieldValue::Null`].
#[derive(Debug, Clone, PartialEq)]
pub struct MaterializedRecord {
    pub entity: EntityKind,
    /// Legacy primary key of the source row
    pub remote_pk: i64,
    pub fields: BTreeMap<&'static str, FieldValue>,
}

impl MaterializedRecord {
    pub const fn new(entity: EntityKind, remote_pk: i64) -> Self {
        Self {
            entity,
            remote_pk,
            fields: BTreeMap::new(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    /// Set a column value. Columns unknown to the entity are ignored.
    pub fn set(&mut self, column: &str, value: FieldValue) {
        if let Some(spec) = self.entity.column(column) {
            self.fields.insert(spec.name, value);
        }
    }

    /// Set a column only when it is absent or blank.
    pub fn set_if_blank(&mut self, column: &str, value: FieldValue) {
        if self.get(column).map_or(true, FieldValue::is_blank) {
            self.set(column, value);
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<FieldValue> {
        self.fields.remove(column)
    }

    pub fn integer(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(FieldValue::as_integer)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FieldValue::as_text)
    }

    /// Local identity of this record, or `None` when a key column is missing
    /// or null.
    pub fn local_key(&self) -> Option<LocalKey> {
        let mut parts = Vec::with_capacity(self.entity.key_columns().len());
        for column in self.entity.key_columns() {
            match self.get(column) {
                Some(value) if !value.is_blank() => parts.push((*column, value.clone())),
                _ => return None,
            }
        }
        Some(LocalKey { parts })
    }
}

/// Column/value pairs identifying one local row
#[derive(Debug, Clone, PartialEq)]
pub struct LocalKey {
    pub parts: Vec<(&'static str, FieldValue)>,
}

impl LocalKey {
    /// `WHERE` clause matching this key, with positional placeholders.
    pub fn where_clause(&self) -> String {
        self.parts
            .iter()
            .map(|(column, _)| format!("{column} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn values(&self) -> impl Iterator<Item = &FieldValue> {
        self.parts.iter().map(|(_, value)| value)
    }
}
