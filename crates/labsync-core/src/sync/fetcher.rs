//! Page fetching against a legacy endpoint that drops requested fields.
//!
//! The endpoint understands the field list in one of several encodings and
//! silently truncates long lists. We try encodings until one returns the
//! fields we asked for, and if none does we fetch the missing fields in
//! smaller chunks and stitch rows back together by key.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::coerce::{coerce_bool, coerce_pk};
use super::transport::{LegacyRequest, LegacyTransport};
use crate::config::FieldMappingPlan;
use crate::error::{Error, Result};
use crate::models::Watermark;
use crate::util::{format_cursor_timestamp, is_blank_json, parse_timestamp};

pub const DEFAULT_PAGE_LIMIT: usize = 1000;
pub const DEFAULT_CHUNK_SIZE: usize = 25;

pub type RemoteRow = Map<String, Value>;

/// How the requested field list is encoded in the query string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldsMode {
    /// `fields=a&fields=b`
    Repeat,
    /// `fields=a,b`
    Csv,
    /// No `fields` parameter; the server picks
    Omit,
}

impl FieldsMode {
    /// Negotiation order.
    pub const ALL: [Self; 3] = [Self::Repeat, Self::Csv, Self::Omit];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Repeat => "repeat",
            Self::Csv => "csv",
            Self::Omit => "omit",
        }
    }
}

impl fmt::Display for FieldsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldsMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "repeat" => Ok(Self::Repeat),
            "csv" => Ok(Self::Csv),
            "omit" | "none" => Ok(Self::Omit),
            other => Err(format!("unknown fields mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub limit: usize,
    pub chunk_size: usize,
    pub chunking: bool,
    /// Skip negotiation and always use this encoding
    pub fields_mode: Option<FieldsMode>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunking: true,
            fields_mode: None,
        }
    }
}

/// What to fetch
#[derive(Debug, Clone, Copy)]
pub struct PageQuery<'a> {
    pub plan: &'a FieldMappingPlan,
    pub watermark: Watermark,
    /// Fetch rows whose remote primary key equals this value instead of
    /// paging by watermark
    pub single_id: Option<i64>,
}

/// One page of remote rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub rows: Vec<RemoteRow>,
    pub next_time: Option<NaiveDateTime>,
    pub next_pk: Option<i64>,
    pub has_more: bool,
    /// Array entries that were not JSON objects
    pub malformed: usize,
}

impl Page {
    /// Boundary reported by the upstream; either half may be missing.
    pub const fn reported_boundary(&self) -> Watermark {
        Watermark::new(self.next_time, self.next_pk)
    }
}

/// Decoded rows response
#[derive(Debug, Clone, Default, PartialEq)]
struct RawPage {
    rows: Vec<RemoteRow>,
    has_more: Option<bool>,
    next_time: Option<NaiveDateTime>,
    next_pk: Option<i64>,
    malformed: usize,
}

impl RawPage {
    fn from_payload(payload: Value) -> Result<Self> {
        let Value::Object(mut object) = payload else {
            return Err(Error::InvalidPayload("expected a JSON object".to_string()));
        };

        let items = match object.remove("items").or_else(|| object.remove("rows")) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(Error::InvalidPayload(format!(
                    "items must be an array, got {other}"
                )))
            }
        };

        let mut rows = Vec::with_capacity(items.len());
        let mut malformed = 0;
        for item in items {
            match item {
                Value::Object(row) => rows.push(row),
                _ => malformed += 1,
            }
        }

        Ok(Self {
            rows,
            has_more: object.get("has_more").and_then(coerce_bool),
            next_time: object
                .get("next_since")
                .and_then(Value::as_str)
                .and_then(parse_timestamp),
            next_pk: object.get("next_since_pk").and_then(coerce_pk),
            malformed,
        })
    }
}

/// How well a response honoured the requested field list
#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldScore {
    missing_required: usize,
    present_expected: usize,
    missing_expected: Vec<String>,
}

impl FieldScore {
    fn of(row: &RemoteRow, required: &[&str], expected: &[&str]) -> Self {
        let missing_expected: Vec<String> = expected
            .iter()
            .filter(|field| !row.contains_key(**field))
            .map(|field| (*field).to_string())
            .collect();
        Self {
            missing_required: required
                .iter()
                .filter(|field| !row.contains_key(**field))
                .count(),
            present_expected: expected.len() - missing_expected.len(),
            missing_expected,
        }
    }

    fn missing_optional(&self) -> usize {
        self.missing_expected.len() - self.missing_required
    }

    fn is_better_than(&self, other: &Self) -> bool {
        (self.missing_required, std::cmp::Reverse(self.present_expected))
            < (other.missing_required, std::cmp::Reverse(other.present_expected))
    }
}

/// Fetches pages for one pass, remembering the negotiated encoding.
pub struct FieldFetcher<'t, T> {
    transport: &'t T,
    settings: FetchSettings,
    mode: Option<FieldsMode>,
}

impl<'t, T: LegacyTransport> FieldFetcher<'t, T> {
    pub fn new(transport: &'t T, settings: FetchSettings) -> Self {
        let mode = settings.fields_mode;
        Self {
            transport,
            settings,
            mode,
        }
    }

    /// Encoding selected so far, if any.
    pub const fn mode(&self) -> Option<FieldsMode> {
        self.mode
    }

    pub async fn fetch_page(&mut self, query: &PageQuery<'_>) -> Result<Page> {
        let plan = query.plan;
        let expected = plan.requested_fields();
        let required = plan.required_fields();
        let optional: Vec<&str> = expected
            .iter()
            .copied()
            .filter(|field| !required.contains(field))
            .collect();
        let tolerance = (expected.len() / 10).max(1);

        let candidates = match self.mode {
            Some(mode) => vec![mode],
            None => FieldsMode::ALL.to_vec(),
        };

        let mut best: Option<(FieldsMode, RawPage, Option<FieldScore>)> = None;
        for mode in candidates {
            let page = self.request(query, mode, &expected).await?;
            let Some(first) = page.rows.first() else {
                best = Some((mode, page, None));
                break;
            };

            let score = FieldScore::of(first, &required, &expected);
            let acceptable =
                score.missing_required == 0 && score.missing_optional() <= tolerance;
            if !score.missing_expected.is_empty() {
                tracing::warn!(
                    table = %plan.remote_table,
                    mode = %mode,
                    missing = ?score.missing_expected,
                    "Legacy response is missing requested fields"
                );
            }

            let improves = match &best {
                Some((_, _, Some(current))) => score.is_better_than(current),
                _ => true,
            };
            if improves {
                best = Some((mode, page, Some(score)));
            }
            if acceptable {
                break;
            }
        }

        let Some((mode, selected, score)) = best else {
            return Err(Error::InvalidPayload(format!(
                "no usable response for {}",
                plan.remote_table
            )));
        };
        if self.mode != Some(mode) {
            tracing::info!(table = %plan.remote_table, mode = %mode, "Selected legacy fields mode");
            self.mode = Some(mode);
        }

        let has_more = selected
            .has_more
            .unwrap_or(selected.rows.len() >= self.settings.limit);
        let mut page = Page {
            rows: Vec::new(),
            next_time: selected.next_time,
            next_pk: selected.next_pk,
            has_more,
            malformed: selected.malformed,
        };

        let needs_chunks = self.settings.chunking
            && !optional.is_empty()
            && score.is_some_and(|score| !score.missing_expected.is_empty());
        page.rows = if needs_chunks {
            let chunk_mode = if mode == FieldsMode::Omit {
                FieldsMode::Repeat
            } else {
                mode
            };
            self.fetch_chunked(query, chunk_mode, &required, &optional, selected.rows)
                .await?
        } else {
            selected.rows
        };

        tracing::info!(
            table = %plan.remote_table,
            rows = page.rows.len(),
            has_more = page.has_more,
            "Fetched legacy page"
        );
        Ok(page)
    }

    async fn fetch_chunked(
        &self,
        query: &PageQuery<'_>,
        mode: FieldsMode,
        required: &[&str],
        optional: &[&str],
        original: Vec<RemoteRow>,
    ) -> Result<Vec<RemoteRow>> {
        let plan = query.plan;
        let merge_key = plan.merge_key();
        let chunk_size = self
            .settings
            .chunk_size
            .min((optional.len() / 2).max(1))
            .max(1);

        let mut merged = RowMerger::new(&merge_key, original);
        for chunk in optional.chunks(chunk_size) {
            let mut fields: Vec<&str> = required.to_vec();
            fields.extend_from_slice(chunk);
            tracing::debug!(
                table = %plan.remote_table,
                fields = fields.len(),
                "Fetching legacy field chunk"
            );
            let page = self.request(query, mode, &fields).await?;
            merged.absorb(page.rows);
        }
        Ok(merged.into_rows())
    }

    async fn request(
        &self,
        query: &PageQuery<'_>,
        mode: FieldsMode,
        fields: &[&str],
    ) -> Result<RawPage> {
        let request = build_request(query, mode, fields, self.settings.limit);
        let payload = self.transport.get_rows(&request).await?;
        RawPage::from_payload(payload)
    }
}

/// Build the query string for one request.
pub fn build_request(
    query: &PageQuery<'_>,
    mode: FieldsMode,
    fields: &[&str],
    limit: usize,
) -> LegacyRequest {
    let plan = query.plan;
    let mut request = LegacyRequest::new(plan.remote_table.clone());

    match mode {
        FieldsMode::Repeat => {
            for field in fields {
                request.push("fields", *field);
            }
        }
        FieldsMode::Csv => request.push("fields", fields.join(",")),
        FieldsMode::Omit => {}
    }

    request.push("modified_field", plan.remote_modified.clone());
    request.push("limit", limit.to_string());
    request.push(
        "order_by",
        format!("-{},-{}", plan.remote_modified, plan.remote_pk),
    );

    if let Some(id) = query.single_id {
        request.push("id", id.to_string());
        request.push("pk_field", plan.remote_pk.clone());
    } else {
        if let Some(since) = &query.watermark.time {
            request.push("since", format_cursor_timestamp(since));
        }
        if let Some(since_pk) = query.watermark.pk {
            request.push("since_pk", since_pk.to_string());
        }
    }
    request
}

/// Stitches rows from several partial responses by merge key.
///
/// The base rows keep their order and are never dropped. Later responses fill
/// fields that are missing or blank, and keyed rows the base lacks are
/// appended.
struct RowMerger<'k> {
    merge_key: &'k [&'k str],
    rows: Vec<RemoteRow>,
    index: HashMap<Vec<String>, usize>,
}

impl<'k> RowMerger<'k> {
    fn new(merge_key: &'k [&'k str], base: Vec<RemoteRow>) -> Self {
        let mut index = HashMap::new();
        for (position, row) in base.iter().enumerate() {
            if let Some(key) = merge_key_of(row, merge_key) {
                index.entry(key).or_insert(position);
            }
        }
        Self {
            merge_key,
            rows: base,
            index,
        }
    }

    fn absorb(&mut self, incoming: Vec<RemoteRow>) {
        for row in incoming {
            let Some(key) = merge_key_of(&row, self.merge_key) else {
                continue;
            };
            let Some(&position) = self.index.get(&key) else {
                self.index.insert(key, self.rows.len());
                self.rows.push(row);
                continue;
            };
            let base = &mut self.rows[position];
            for (field, value) in row {
                let fill = match base.get(&field) {
                    None => true,
                    Some(existing) => {
                        is_blank_json(Some(existing)) && !is_blank_json(Some(&value))
                    }
                };
                if fill {
                    base.insert(field, value);
                }
            }
        }
    }

    fn into_rows(self) -> Vec<RemoteRow> {
        self.rows
    }
}

/// Canonical merge key; `None` when any part is missing or blank.
fn merge_key_of(row: &RemoteRow, merge_key: &[&str]) -> Option<Vec<String>> {
    if merge_key.is_empty() {
        return None;
    }
    merge_key
        .iter()
        .map(|field| {
            let value = row.get(*field)?;
            if is_blank_json(Some(value)) {
                return None;
            }
            Some(match value {
                Value::String(text) => {
                    let text = text.trim();
                    coerce_pk(value).map_or_else(|| text.to_string(), |pk| pk.to_string())
                }
                Value::Number(_) => {
                    coerce_pk(value).map_or_else(|| value.to_string(), |pk| pk.to_string())
                }
                other => other.to_string(),
            })
        })
        .collect()
}
