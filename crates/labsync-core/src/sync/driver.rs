//! One entity pass: cursor → fetch → materialize → upsert → cursor.

use rusqlite::{Connection, Transaction};
use serde_json::Value;

use super::coerce::{coerce_pk, materialize, SkipReason};
use super::fetcher::{FetchSettings, FieldFetcher, Page, PageQuery, RemoteRow};
use super::placeholder::PlaceholderResolver;
use super::transport::LegacyTransport;
use super::upsert::UpsertEngine;
use super::SyncSummary;
use crate::config::FieldMappingPlan;
use crate::db::{CursorStore, SqliteCursorStore};
use crate::error::Result;
use crate::models::Watermark;
use crate::util::{parse_timestamp, utc_now};

pub const DEFAULT_MAX_TOUCHED: usize = 1000;

/// Which rows a pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Everything after the stored cursor
    Incremental,
    /// Rows whose remote primary key equals the id; the cursor is not used
    Single(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    pub fetch: FetchSettings,
    /// Stop after this many fetched pages
    pub max_pages: Option<usize>,
    pub reset_cursor: bool,
    /// Roll back every page transaction
    pub dry_run: bool,
    pub backfill_missing: bool,
    pub max_touched: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            fetch: FetchSettings::default(),
            max_pages: None,
            reset_cursor: false,
            dry_run: false,
            backfill_missing: false,
            max_touched: DEFAULT_MAX_TOUCHED,
        }
    }
}

/// Runs entity passes against one local database.
///
/// Page transactions are opened only after the page has been fetched, so no
/// transaction is ever held across an HTTP request.
pub struct SyncDriver<'a, T> {
    conn: &'a Connection,
    transport: &'a T,
    options: SyncOptions,
}

impl<'a, T: LegacyTransport> SyncDriver<'a, T> {
    pub const fn new(conn: &'a Connection, transport: &'a T, options: SyncOptions) -> Self {
        Self {
            conn,
            transport,
            options,
        }
    }

    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub async fn run(&self, plan: &FieldMappingPlan, scope: Scope) -> Result<SyncSummary> {
        let table = plan.remote_table.as_str();
        let mut summary = SyncSummary::new(plan.entity, table, self.options.dry_run);
        let single_id = match scope {
            Scope::Incremental => None,
            Scope::Single(id) => Some(id),
        };
        let mut watermark = match scope {
            Scope::Incremental => self.open_cursor(table)?,
            Scope::Single(_) => Watermark::default(),
        };

        tracing::info!(
            entity = %plan.entity,
            table,
            ?scope,
            since = ?watermark.time,
            since_pk = ?watermark.pk,
            dry_run = self.options.dry_run,
            "Starting legacy sync pass"
        );

        let mut fetcher = FieldFetcher::new(self.transport, self.options.fetch.clone());
        let mut last_sent: Option<Watermark> = None;
        loop {
            if self
                .options
                .max_pages
                .is_some_and(|max_pages| summary.pages >= max_pages)
            {
                tracing::info!(table, pages = summary.pages, "Reached max pages");
                break;
            }
            if scope == Scope::Incremental {
                if last_sent == Some(watermark) {
                    tracing::warn!(
                        table,
                        since = ?watermark.time,
                        since_pk = ?watermark.pk,
                        "Legacy sync cursor repeated; the endpoint may be ignoring since/since_pk"
                    );
                    break;
                }
                last_sent = Some(watermark);
            }

            let page = fetcher
                .fetch_page(&PageQuery {
                    plan,
                    watermark,
                    single_id,
                })
                .await?;
            summary.pages += 1;
            summary.skipped += page.malformed;
            if page.rows.is_empty() {
                break;
            }

            let tx = self.conn.unchecked_transaction()?;
            self.apply_page(&tx, plan, &page, &mut summary)?;
            if scope == Scope::Incremental {
                let boundary = page
                    .reported_boundary()
                    .or(last_row_boundary(plan, &page.rows))
                    .or(watermark);
                SqliteCursorStore::new(&tx).advance(table, boundary)?;
                watermark = boundary;
            }
            self.finish(tx)?;

            if single_id.is_some() || !page.has_more {
                break;
            }
        }

        tracing::info!(
            entity = %plan.entity,
            pages = summary.pages,
            items = summary.items,
            inserted = summary.inserted,
            updated = summary.updated,
            backfilled = summary.backfilled,
            conflicted = summary.conflicted,
            skipped = summary.skipped,
            placeholders = summary.placeholders,
            "Finished legacy sync pass"
        );
        Ok(summary)
    }

    /// Create (and optionally reset) the cursor row and return its watermark.
    fn open_cursor(&self, table: &str) -> Result<Watermark> {
        let tx = self.conn.unchecked_transaction()?;
        let store = SqliteCursorStore::new(&tx);
        store.ensure(table)?;
        let watermark = if self.options.reset_cursor {
            tracing::info!(table, "Resetting legacy sync cursor");
            store.reset(table)?;
            Watermark::default()
        } else {
            store.read(table)?
        };
        self.finish(tx)?;
        Ok(watermark)
    }

    fn apply_page(
        &self,
        tx: &Transaction<'_>,
        plan: &FieldMappingPlan,
        page: &Page,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        let now = utc_now();
        let upsert = UpsertEngine::new(tx, self.options.backfill_missing, now);
        let placeholders = PlaceholderResolver::new(tx, now);

        for row in &page.rows {
            summary.items += 1;
            let record = match materialize(plan, row) {
                Ok(record) => record,
                Err(SkipReason::BlankComment) => {
                    summary.skipped_blank += 1;
                    continue;
                }
                Err(reason) => {
                    tracing::debug!(table = %plan.remote_table, ?reason, "Skipped legacy row");
                    summary.skipped += 1;
                    continue;
                }
            };

            summary.touch(record.remote_pk, self.options.max_touched);
            summary.placeholders += placeholders.ensure_parents(&record)?;
            summary.record(upsert.apply(&record)?);
        }
        Ok(())
    }

    fn finish(&self, tx: Transaction<'_>) -> Result<()> {
        if self.options.dry_run {
            tx.rollback()?;
        } else {
            tx.commit()?;
        }
        Ok(())
    }
}

/// `(modified, pk)` of the last row, for halves the upstream did not report.
fn last_row_boundary(plan: &FieldMappingPlan, rows: &[RemoteRow]) -> Watermark {
    let Some(last) = rows.last() else {
        return Watermark::default();
    };
    let time = last
        .get(&plan.remote_modified)
        .and_then(Value::as_str)
        .and_then(parse_timestamp);
    Watermark::new(time, last.get(&plan.remote_pk).and_then(coerce_pk))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MappingSet;
    use crate::models::EntityKind;
    use serde_json::json;

    #[test]
    fn last_row_boundary_reads_modified_and_pk() {
        let mapping = MappingSet::embedded().unwrap();
        let plan = mapping.plan(EntityKind::Projects).unwrap();
        let rows = vec![
            json!({"prj_PRJRecNo": 1, "prj_ModificationTS": "2025-01-01 00:00:00"}),
            json!({"prj_PRJRecNo": 2.0, "prj_ModificationTS": "2025-01-02T00:00:00Z"}),
        ]
        .into_iter()
        .map(|row| row.as_object().unwrap().clone())
        .collect::<Vec<_>>();

        assert_eq!(
            last_row_boundary(plan, &rows),
            Watermark::new(parse_timestamp("2025-01-02 00:00:00"), Some(2))
        );
        assert!(last_row_boundary(plan, &[]).is_empty());
    }

    #[test]
    fn boundary_halves_fall_back_independently() {
        let previous = Watermark::new(parse_timestamp("2025-11-30 00:00:00"), Some(1));
        let last_row = Watermark::new(parse_timestamp("2025-12-05 12:16:37"), Some(7));

        let pk_only = Watermark::new(None, Some(9)).or(last_row).or(previous);
        assert_eq!(pk_only, Watermark::new(last_row.time, Some(9)));

        let time_only = Watermark::new(parse_timestamp("2025-12-06 00:00:00"), None)
            .or(Watermark::new(None, None))
            .or(previous);
        assert_eq!(
            time_only,
            Watermark::new(parse_timestamp("2025-12-06 00:00:00"), Some(1))
        );
    }

    #[test]
    fn default_options_are_conservative() {
        let options = SyncOptions::default();
        assert!(!options.dry_run);
        assert!(!options.backfill_missing);
        assert_eq!(options.max_pages, None);
        assert_eq!(options.fetch.limit, 1000);
    }
}
