//! Entry points for hosts: resolve settings, open the store, run a pass.

use std::path::{Path, PathBuf};

use super::driver::{Scope, SyncDriver, SyncOptions};
use super::fetcher::{FetchSettings, FieldsMode, DEFAULT_PAGE_LIMIT};
use super::orchestrator::{
    sync_all, SyncAllOptions, DEFAULT_MAX_EXPERIMENT_RUNS, DEFAULT_MAX_PROJECT_COMMENTS,
};
use super::transport::HttpTransport;
use super::{SyncAllSummary, SyncSummary};
use crate::config::{LegacyEnv, LegacySettings, MappingSet};
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::EntityKind;

/// One entity pass as requested by a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub entity: EntityKind,
    /// Sync only rows whose remote primary key equals this id
    pub id: Option<i64>,
    pub legacy_url: Option<String>,
    /// Mapping document overriding the embedded one
    pub mapping_path: Option<PathBuf>,
    pub db_path: PathBuf,
    pub limit: usize,
    /// Field list encoding to use instead of negotiating one
    pub fields_mode: Option<FieldsMode>,
    pub max_pages: Option<usize>,
    pub reset_cursor: bool,
    pub dry_run: bool,
    pub backfill_missing: bool,
}

impl SyncRequest {
    pub fn new(entity: EntityKind, db_path: impl Into<PathBuf>) -> Self {
        Self {
            entity,
            id: None,
            legacy_url: None,
            mapping_path: None,
            db_path: db_path.into(),
            limit: DEFAULT_PAGE_LIMIT,
            fields_mode: None,
            max_pages: None,
            reset_cursor: false,
            dry_run: false,
            backfill_missing: false,
        }
    }

    pub fn options(&self) -> Result<SyncOptions> {
        Ok(SyncOptions {
            fetch: fetch_settings(self.limit, self.fields_mode)?,
            max_pages: self.max_pages,
            reset_cursor: self.reset_cursor,
            dry_run: self.dry_run,
            backfill_missing: self.backfill_missing,
            ..SyncOptions::default()
        })
    }
}

/// A full multi-entity run as requested by a host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAllRequest {
    pub legacy_url: Option<String>,
    pub mapping_path: Option<PathBuf>,
    pub db_path: PathBuf,
    pub limit: usize,
    pub fields_mode: Option<FieldsMode>,
    pub max_pages: Option<usize>,
    pub reset_cursor: bool,
    pub dry_run: bool,
    pub backfill_missing: bool,
    pub max_project_comments: usize,
    pub max_experiment_runs: usize,
}

impl SyncAllRequest {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            legacy_url: None,
            mapping_path: None,
            db_path: db_path.into(),
            limit: DEFAULT_PAGE_LIMIT,
            fields_mode: None,
            max_pages: None,
            reset_cursor: false,
            dry_run: false,
            backfill_missing: true,
            max_project_comments: DEFAULT_MAX_PROJECT_COMMENTS,
            max_experiment_runs: DEFAULT_MAX_EXPERIMENT_RUNS,
        }
    }

    pub fn options(&self) -> Result<SyncAllOptions> {
        Ok(SyncAllOptions {
            sync: SyncOptions {
                fetch: fetch_settings(self.limit, self.fields_mode)?,
                max_pages: self.max_pages,
                reset_cursor: self.reset_cursor,
                dry_run: self.dry_run,
                backfill_missing: self.backfill_missing,
                ..SyncOptions::default()
            },
            max_project_comments: self.max_project_comments,
            max_experiment_runs: self.max_experiment_runs,
        })
    }
}

fn fetch_settings(limit: usize, fields_mode: Option<FieldsMode>) -> Result<FetchSettings> {
    if limit == 0 {
        return Err(Error::InvalidInput("limit must be at least 1".to_string()));
    }
    Ok(FetchSettings {
        limit,
        fields_mode,
        ..FetchSettings::default()
    })
}

/// Run one entity pass against the legacy service over HTTP.
///
/// `default_conf_path` is the legacy config file consulted when
/// `LABSYNC_LEGACY_CONF` is unset.
pub async fn run_sync(
    request: &SyncRequest,
    env: &LegacyEnv,
    default_conf_path: Option<&Path>,
) -> Result<SyncSummary> {
    let options = request.options()?;
    let mapping = MappingSet::load(request.mapping_path.as_deref())?;
    let plan = mapping.plan(request.entity)?;
    let settings = LegacySettings::resolve(request.legacy_url.as_deref(), env, default_conf_path)?;
    let transport = HttpTransport::new(settings)?;
    let db = Database::open(&request.db_path)?;

    tracing::debug!(
        entity = %request.entity,
        base_url = transport.base_url(),
        db_path = %request.db_path.display(),
        "Resolved legacy sync request"
    );

    let scope = request.id.map_or(Scope::Incremental, Scope::Single);
    SyncDriver::new(db.connection(), &transport, options)
        .run(plan, scope)
        .await
}

/// Run the multi-entity sync against the legacy service over HTTP.
pub async fn run_sync_all(
    request: &SyncAllRequest,
    env: &LegacyEnv,
    default_conf_path: Option<&Path>,
) -> Result<SyncAllSummary> {
    let options = request.options()?;
    let mapping = MappingSet::load(request.mapping_path.as_deref())?;
    let settings = LegacySettings::resolve(request.legacy_url.as_deref(), env, default_conf_path)?;
    let transport = HttpTransport::new(settings)?;
    let db = Database::open(&request.db_path)?;

    sync_all(db.connection(), &transport, &mapping, &options).await
}
