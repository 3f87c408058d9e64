//! Remote row → typed local record.

use serde_json::{Map, Value};

use crate::config::FieldMappingPlan;
use crate::models::{
    ColumnKind, ColumnSpec, EntityKind, FieldValue, MaterializedRecord, SYNC_MARKER,
    SYSTEM_PERSON_ID,
};
use crate::util::parse_timestamp;

const TRUTHY: &[&str] = &["1", "true", "yes", "y", "on", "t"];
const FALSY: &[&str] = &["0", "false", "no", "n", "off", "f", ""];

/// Why a remote row produced no record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Remote primary key absent or not an integer
    MissingPk,
    /// A local key column could not be filled
    MissingKey,
    /// Comment rows with no text
    BlankComment,
}

/// Map and coerce one remote row.
pub fn materialize(
    plan: &FieldMappingPlan,
    row: &Map<String, Value>,
) -> Result<MaterializedRecord, SkipReason> {
    let pk = row
        .get(&plan.remote_pk)
        .and_then(coerce_pk)
        .ok_or(SkipReason::MissingPk)?;

    let mut record = MaterializedRecord::new(plan.entity, pk);
    for binding in &plan.bindings {
        if binding.column.name == plan.pk_column.name {
            continue;
        }
        let Some(raw) = row.get(&binding.remote) else {
            continue;
        };
        if let Some(value) = coerce_value(binding.column, raw) {
            record.set(binding.column.name, value);
        }
    }
    record.set(plan.pk_column.name, FieldValue::Integer(pk));

    complete_record(&mut record)?;
    if record.local_key().is_none() {
        return Err(SkipReason::MissingKey);
    }
    Ok(record)
}

/// Fill the values every local row needs but the legacy side may omit.
fn complete_record(record: &mut MaterializedRecord) -> Result<(), SkipReason> {
    record.set_if_blank("added_by", FieldValue::Text(SYNC_MARKER.to_string()));
    let id = record.remote_pk;

    match record.entity {
        EntityKind::Projects => {
            record.set_if_blank("title", FieldValue::Text(untitled_project_title(id)));
            record.set_if_blank("display_id", FieldValue::Text(project_display_id(id)));
            let display_title = format!(
                "{} - {}",
                record.text("display_id").unwrap_or_default(),
                record.text("title").unwrap_or_default()
            );
            record.set_if_blank("display_title", FieldValue::Text(display_title));
        }
        EntityKind::People => {}
        EntityKind::Experiments => {
            record.set_if_blank("record_no", FieldValue::Text(id.to_string()));
        }
        EntityKind::ExperimentRuns => {
            for column in ["run_no", "search_no"] {
                if record.integer(column).map_or(true, |value| value <= 0) {
                    record.set(column, FieldValue::Integer(1));
                }
            }
        }
        EntityKind::ProjectComments => {
            if record.get("person_id").map_or(true, FieldValue::is_blank) {
                record.set("person_id", FieldValue::Integer(SYSTEM_PERSON_ID));
            }
            if record.get("comment").map_or(true, FieldValue::is_blank) {
                return Err(SkipReason::BlankComment);
            }
            if record.get("created_at").is_none() {
                return Err(SkipReason::MissingKey);
            }
        }
    }
    Ok(())
}

/// `Untitled (PRJ 42)`
pub fn untitled_project_title(id: i64) -> String {
    format!("Untitled (PRJ {id})")
}

/// `MSPC000042`
pub fn project_display_id(id: i64) -> String {
    format!("MSPC{id:06}")
}

/// Integer primary key from an integer, an integral float, or a numeric
/// string.
pub fn coerce_pk(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|float| float.is_finite() && float.fract() == 0.0)
                .and_then(float_to_i64)
        }),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>().ok().or_else(|| {
                text.parse::<f64>()
                    .ok()
                    .filter(|float| float.is_finite() && float.fract() == 0.0)
                    .and_then(float_to_i64)
            })
        }
        _ => None,
    }
}

/// Legacy boolean vocabulary; `None` when the value is not recognized.
pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::Number(number) => number.as_f64().map(|float| float != 0.0),
        Value::String(text) => {
            let normalized = text.trim().to_ascii_lowercase();
            if TRUTHY.contains(&normalized.as_str()) {
                Some(true)
            } else if FALSY.contains(&normalized.as_str()) {
                Some(false)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Coerce a raw value for `column`. `None` means leave the column unset.
pub fn coerce_value(column: &ColumnSpec, raw: &Value) -> Option<FieldValue> {
    let fallback = null_fallback(column);
    if raw.is_null() {
        return fallback;
    }

    match column.kind {
        ColumnKind::Boolean => coerce_bool(raw).map(FieldValue::Bool).or(fallback),
        ColumnKind::Timestamp => match raw {
            Value::String(text) => parse_timestamp(text).map(FieldValue::Timestamp),
            _ => None,
        },
        ColumnKind::Integer => coerce_integer(raw).map(FieldValue::Integer).or(fallback),
        ColumnKind::Float => coerce_float(raw).map(FieldValue::Float).or(fallback),
        ColumnKind::Text => match render_text(raw) {
            Some(text) => Some(FieldValue::Text(text)),
            None => fallback,
        },
    }
}

/// Value used for null or unusable input.
fn null_fallback(column: &ColumnSpec) -> Option<FieldValue> {
    if column.nullable {
        return Some(FieldValue::Null);
    }
    match column.kind {
        ColumnKind::Boolean => Some(FieldValue::Bool(false)),
        ColumnKind::Integer => Some(FieldValue::Integer(0)),
        ColumnKind::Float => Some(FieldValue::Float(0.0)),
        ColumnKind::Text | ColumnKind::Timestamp => None,
    }
}

fn coerce_integer(raw: &Value) -> Option<i64> {
    match raw {
        Value::Bool(flag) => Some(i64::from(*flag)),
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(f64::trunc).and_then(float_to_i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(f64::trunc).and_then(float_to_i64))
        }
        _ => None,
    }
}

fn coerce_float(raw: &Value) -> Option<f64> {
    match raw {
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|float| float.is_finite()),
        _ => None,
    }
}

fn render_text(raw: &Value) -> Option<String> {
    let text = match raw {
        Value::Null => return None,
        Value::String(text) => text.trim().to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => integer.to_string(),
            None => number
                .as_f64()
                .filter(|float| float.fract() == 0.0)
                .and_then(float_to_i64)
                .map_or_else(|| number.to_string(), |integer| integer.to_string()),
        },
        Value::Array(_) | Value::Object(_) => raw.to_string(),
    };
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_i64(value: f64) -> Option<i64> {
    if value.is_finite() && value >= i64::MIN as f64 && value <= i64::MAX as f64 {
        Some(value as i64)
    } else {
        None
    }
}
