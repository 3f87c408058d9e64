//! In-memory stand-in for the legacy rows endpoint.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use labsync_core::db::Database;
use labsync_core::sync::{coerce_pk, LegacyRequest, LegacyTransport, RemoteRow, SyncOptions};
use labsync_core::util::{format_cursor_timestamp, parse_timestamp};
use labsync_core::{Error, Result};
use serde_json::{json, Map, Value};

struct FakeTable {
    pk: String,
    modified: String,
    rows: Vec<RemoteRow>,
}

/// Serves rows ascending by `(modified, pk)`, strictly after `since`/`since_pk`.
#[derive(Default)]
pub struct FakeLegacy {
    tables: Mutex<HashMap<String, FakeTable>>,
    max_fields: Option<usize>,
    max_partial_rows: Option<usize>,
    ignore_cursor: bool,
    omit_next_since: bool,
    omit_next_since_pk: bool,
    widest_request: Mutex<usize>,
    failure: Mutex<Option<String>>,
    requests: Mutex<Vec<LegacyRequest>>,
}

impl FakeLegacy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(self, table: &str, pk: &str, modified: &str, rows: Vec<Value>) -> Self {
        self.tables.lock().unwrap().insert(
            table.to_string(),
            FakeTable {
                pk: pk.to_string(),
                modified: modified.to_string(),
                rows: objects(rows),
            },
        );
        self
    }

    pub fn with_projects(self, rows: Vec<Value>) -> Self {
        self.with_table("iSPEC_Projects", "prj_PRJRecNo", "prj_ModificationTS", rows)
    }

    pub fn with_people(self, rows: Vec<Value>) -> Self {
        self.with_table("iSPEC_People", "ppl_PPLRecNo", "ppl_ModificationTS", rows)
    }

    pub fn with_experiments(self, rows: Vec<Value>) -> Self {
        self.with_table("iSPEC_Experiments", "exp_EXPRecNo", "exp_ModificationTS", rows)
    }

    pub fn with_runs(self, rows: Vec<Value>) -> Self {
        self.with_table(
            "iSPEC_ExperimentRuns",
            "exprun_EXPRecNo",
            "exprun_ModificationTS",
            rows,
        )
    }

    pub fn with_comments(self, rows: Vec<Value>) -> Self {
        self.with_table("iSPEC_ProjectHistory", "prh_PRJRecNo", "prh_ModificationTS", rows)
    }

    /// Keep only the first `max_fields` requested fields of every row.
    pub fn truncating_fields(mut self, max_fields: usize) -> Self {
        self.max_fields = Some(max_fields);
        self
    }

    /// Return at most `max_rows` rows to requests for fewer fields than the
    /// widest request seen so far.
    pub fn truncating_partial_rows(mut self, max_rows: usize) -> Self {
        self.max_partial_rows = Some(max_rows);
        self
    }

    /// Report `next_since` as null.
    pub fn omitting_next_since(mut self) -> Self {
        self.omit_next_since = true;
        self
    }

    /// Report `next_since_pk` as null.
    pub fn omitting_next_since_pk(mut self) -> Self {
        self.omit_next_since_pk = true;
        self
    }

    /// Answer every request from the start of the table.
    pub fn ignoring_cursor(mut self) -> Self {
        self.ignore_cursor = true;
        self
    }

    pub fn replace_rows(&self, table: &str, rows: Vec<Value>) {
        if let Some(entry) = self.tables.lock().unwrap().get_mut(table) {
            entry.rows = objects(rows);
        }
    }

    pub fn fail_with(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(str::to_string);
    }

    pub fn requests(&self) -> Vec<LegacyRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_for(&self, table: &str) -> Vec<LegacyRequest> {
        self.requests()
            .into_iter()
            .filter(|request| request.table == table)
            .collect()
    }

    fn project_row(&self, row: &RemoteRow, requested: &[String]) -> Value {
        let names: Vec<&String> = if requested.is_empty() {
            row.keys().collect()
        } else {
            requested.iter().collect()
        };
        let projected: Map<String, Value> = names
            .into_iter()
            .take(self.max_fields.unwrap_or(usize::MAX))
            .filter_map(|name| row.get(name).map(|value| (name.clone(), value.clone())))
            .collect();
        Value::Object(projected)
    }
}

impl LegacyTransport for FakeLegacy {
    async fn get_rows(&self, request: &LegacyRequest) -> Result<Value> {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(Error::Api(message));
        }

        let tables = self.tables.lock().unwrap();
        let Some(table) = tables.get(&request.table) else {
            return Err(Error::Api(format!("404: unknown table {}", request.table)));
        };

        let boundary = |row: &RemoteRow| {
            (
                row.get(&table.modified)
                    .and_then(Value::as_str)
                    .and_then(parse_timestamp),
                row.get(&table.pk).and_then(coerce_pk),
            )
        };
        let mut rows: Vec<&RemoteRow> = table.rows.iter().collect();
        rows.sort_by_key(|row| boundary(*row));

        if let Some(id) = request.value("id").and_then(|raw| raw.parse::<i64>().ok()) {
            let pk_field = request.value("pk_field").unwrap_or(&table.pk);
            rows.retain(|row| row.get(pk_field).and_then(coerce_pk) == Some(id));
        } else if !self.ignore_cursor {
            let since = request.value("since").and_then(parse_timestamp);
            let since_pk = request
                .value("since_pk")
                .and_then(|raw| raw.parse::<i64>().ok());
            if since.is_some() || since_pk.is_some() {
                rows.retain(|row| boundary(*row) > (since, since_pk));
            }
        }

        let limit = request
            .value("limit")
            .and_then(|raw| raw.parse::<usize>().ok())
            .unwrap_or(usize::MAX);
        let has_more = rows.len() > limit;
        rows.truncate(limit);

        let requested: Vec<String> = request
            .values("fields")
            .iter()
            .flat_map(|value| value.split(','))
            .map(str::to_string)
            .collect();
        let widest = {
            let mut widest = self.widest_request.lock().unwrap();
            *widest = (*widest).max(requested.len());
            *widest
        };
        if let Some(max_rows) = self.max_partial_rows {
            if !requested.is_empty() && requested.len() < widest {
                rows.truncate(max_rows);
            }
        }

        let items: Vec<Value> = rows
            .iter()
            .map(|row| self.project_row(*row, &requested))
            .collect();

        let mut payload = json!({
            "ok": true,
            "table": request.table,
            "items": items,
            "has_more": has_more,
        });
        if let Some((time, pk)) = rows.last().map(|row| boundary(*row)) {
            payload["next_since"] = match time {
                Some(time) if !self.omit_next_since => json!(format_cursor_timestamp(&time)),
                _ => Value::Null,
            };
            payload["next_since_pk"] = match pk {
                Some(pk) if !self.omit_next_since_pk => json!(pk),
                _ => Value::Null,
            };
        }
        Ok(payload)
    }
}

fn objects(rows: Vec<Value>) -> Vec<RemoteRow> {
    rows.into_iter()
        .filter_map(|row| match row {
            Value::Object(object) => Some(object),
            _ => None,
        })
        .collect()
}

pub fn project(id: i64, title: &str, modified: &str) -> Value {
    json!({
        "prj_PRJRecNo": id,
        "prj_ProjectTitle": title,
        "prj_AddedBy": "legacy-user",
        "prj_Status": "open",
        "prj_CreationTS": "2025-01-01 00:00:00",
        "prj_ModificationTS": modified,
    })
}

pub fn person(id: i64, first: &str, last: &str, modified: &str) -> Value {
    json!({
        "ppl_PPLRecNo": id,
        "ppl_Name_First": first,
        "ppl_Name_Last": last,
        "ppl_CreationTS": "2025-01-01 00:00:00",
        "ppl_ModificationTS": modified,
    })
}

pub fn experiment(id: i64, project_id: i64, modified: &str) -> Value {
    json!({
        "exp_EXPRecNo": id,
        "exp_Exp_ProjectNo": project_id,
        "exp_IDENTIFIER": format!("Experiment {id}"),
        "exp_CreationTS": "2025-01-01 00:00:00",
        "exp_ModificationTS": modified,
    })
}

pub fn run(experiment_id: i64, run_no: i64, search_no: i64, modified: &str) -> Value {
    json!({
        "exprun_EXPRecNo": experiment_id,
        "exprun_EXPRunNo": run_no,
        "exprun_EXPSearchNo": search_no,
        "exprun_DBSearch_FLAG": 0,
        "exprun_CreationTS": "2025-01-01 00:00:00",
        "exprun_ModificationTS": modified,
    })
}

pub fn comment(project_id: f64, created: &str, kind: &str, text: &str) -> Value {
    json!({
        "prh_PRJRecNo": project_id,
        "prh_CreationTS": created,
        "prh_ModificationTS": created,
        "prh_AddedBy": "legacy-user",
        "prh_CommentType": kind,
        "prh_Comment": text,
    })
}

pub fn options() -> SyncOptions {
    SyncOptions::default()
}

pub fn count(db: &Database, table: &str) -> i64 {
    db.connection()
        .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
        .unwrap()
}

pub fn text(db: &Database, sql: &str, id: i64) -> Option<String> {
    db.connection()
        .query_row(sql, [id], |row| row.get(0))
        .unwrap()
}
