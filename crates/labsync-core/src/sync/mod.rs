//! Incremental legacy synchronization engine.
//!
//! A pass reads the table cursor, fetches pages through [`FieldFetcher`],
//! materializes rows, creates placeholder parents, applies records with the
//! conflict-aware [`UpsertEngine`], and advances the cursor in the same
//! transaction as the page it describes.

mod coerce;
mod driver;
mod fetcher;
mod orchestrator;
mod ownership;
mod placeholder;
mod service;
mod transport;
mod upsert;

use serde::Serialize;

pub use coerce::{
    coerce_bool, coerce_pk, coerce_value, materialize, project_display_id,
    untitled_project_title, SkipReason,
};
pub use driver::{Scope, SyncDriver, SyncOptions, DEFAULT_MAX_TOUCHED};
pub use fetcher::{
    build_request, FetchSettings, FieldFetcher, FieldsMode, Page, PageQuery, RemoteRow,
    DEFAULT_CHUNK_SIZE, DEFAULT_PAGE_LIMIT,
};
pub use orchestrator::{
    sync_all, SyncAllOptions, DEFAULT_MAX_EXPERIMENT_RUNS, DEFAULT_MAX_PROJECT_COMMENTS,
};
pub use ownership::{classify_ownership, Ownership, OwnershipFacts};
pub use placeholder::PlaceholderResolver;
pub use service::{run_sync, run_sync_all, SyncAllRequest, SyncRequest};
pub use transport::{parse_payload, HttpTransport, LegacyRequest, LegacyTransport};
pub use upsert::{UpsertEngine, UpsertOutcome};

use crate::models::EntityKind;

/// Counters for one entity pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub entity: Option<EntityKind>,
    pub table: String,
    pub dry_run: bool,
    pub pages: usize,
    pub items: usize,
    pub inserted: usize,
    pub updated: usize,
    pub backfilled: usize,
    pub conflicted: usize,
    pub skipped: usize,
    pub skipped_blank: usize,
    pub placeholders: usize,
    /// Distinct remote ids seen, in fetch order
    pub touched_ids: Vec<i64>,
}

impl SyncSummary {
    pub fn new(entity: EntityKind, table: impl Into<String>, dry_run: bool) -> Self {
        Self {
            entity: Some(entity),
            table: table.into(),
            dry_run,
            ..Self::default()
        }
    }

    pub fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Backfilled => self.backfilled += 1,
            UpsertOutcome::Conflicted => self.conflicted += 1,
        }
    }

    pub fn touch(&mut self, id: i64, max_touched: usize) {
        if self.touched_ids.len() < max_touched && !self.touched_ids.contains(&id) {
            self.touched_ids.push(id);
        }
    }

    /// Add another pass's counters to this one.
    pub fn absorb(&mut self, other: &Self) {
        self.pages += other.pages;
        self.items += other.items;
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.backfilled += other.backfilled;
        self.conflicted += other.conflicted;
        self.skipped += other.skipped;
        self.skipped_blank += other.skipped_blank;
        self.placeholders += other.placeholders;
    }
}

/// Per-parent passes fanned out after the incremental passes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeepSyncSummary {
    pub requested: usize,
    pub failed: usize,
    pub totals: SyncSummary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncAllSummary {
    pub projects: SyncSummary,
    pub people: SyncSummary,
    pub experiments: SyncSummary,
    pub project_comments: DeepSyncSummary,
    pub experiment_runs: DeepSyncSummary,
}
