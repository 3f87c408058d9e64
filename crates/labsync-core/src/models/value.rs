//! Typed column values

use chrono::NaiveDateTime;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};

use super::entity::ColumnKind;
use crate::util::{format_storage_timestamp, parse_timestamp};

/// A value bound for (or read from) one local column
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl FieldValue {
    /// Null or whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(text) => text.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub const fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Self::Timestamp(value) => Some(*value),
            _ => None,
        }
    }

    /// Decode a stored column according to its declared kind.
    pub fn from_column(kind: ColumnKind, raw: ValueRef<'_>) -> Self {
        match (kind, raw) {
            (_, ValueRef::Null) => Self::Null,
            (ColumnKind::Boolean, ValueRef::Integer(value)) => Self::Bool(value != 0),
            (ColumnKind::Float, ValueRef::Integer(value)) => {
                #[allow(clippy::cast_precision_loss)]
                let value = value as f64;
                Self::Float(value)
            }
            (_, ValueRef::Integer(value)) => Self::Integer(value),
            (_, ValueRef::Real(value)) => Self::Float(value),
            (ColumnKind::Timestamp, ValueRef::Text(bytes)) => {
                let text = String::from_utf8_lossy(bytes);
                parse_timestamp(&text)
                    .map_or_else(|| Self::Text(text.into_owned()), Self::Timestamp)
            }
            (_, ValueRef::Text(bytes)) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
            (_, ValueRef::Blob(bytes)) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(Value::Null),
            Self::Bool(value) => ToSqlOutput::Owned(Value::Integer(i64::from(*value))),
            Self::Integer(value) => ToSqlOutput::Owned(Value::Integer(*value)),
            Self::Float(value) => ToSqlOutput::Owned(Value::Real(*value)),
            Self::Text(value) => ToSqlOutput::Borrowed(ValueRef::Text(value.as_bytes())),
            Self::Timestamp(value) => {
                ToSqlOutput::Owned(Value::Text(format_storage_timestamp(value)))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values() {
        assert!(FieldValue::Null.is_blank());
        assert!(FieldValue::Text(" \t".to_string()).is_blank());
        assert!(!FieldValue::Text("x".to_string()).is_blank());
        assert!(!FieldValue::Bool(false).is_blank());
        assert!(!FieldValue::Integer(0).is_blank());
    }

    #[test]
    fn decodes_columns_by_kind() {
        assert_eq!(
            FieldValue::from_column(ColumnKind::Boolean, ValueRef::Integer(1)),
            FieldValue::Bool(true)
        );
        assert_eq!(
            FieldValue::from_column(ColumnKind::Float, ValueRef::Integer(3)),
            FieldValue::Float(3.0)
        );
        assert_eq!(
            FieldValue::from_column(ColumnKind::Text, ValueRef::Null),
            FieldValue::Null
        );
        let stored = FieldValue::from_column(
            ColumnKind::Timestamp,
            ValueRef::Text(b"2026-01-02 00:00:00.000000"),
        );
        assert!(stored.as_timestamp().is_some());
    }
}
