use std::env;
use std::path::PathBuf;

use labsync_core::models::Watermark;
use labsync_core::sync::{DeepSyncSummary, SyncAllSummary, SyncSummary};
use labsync_core::util::format_cursor_timestamp;
use labsync_core::SyncCursor;

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "LABSYNC_DB_PATH";

/// Where a command reads from and writes to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub db_path: PathBuf,
    pub legacy_url: Option<String>,
    pub mapping_path: Option<PathBuf>,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from)) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("labsync").join("labsync.db"))
        .ok_or(CliError::NoDataDir)
}

/// `~/.labsync/legacy.conf`, consulted when `LABSYNC_LEGACY_CONF` is unset.
pub fn default_legacy_conf_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".labsync").join("legacy.conf"))
}

pub fn format_summary_line(summary: &SyncSummary) -> String {
    let entity = summary
        .entity
        .map_or_else(|| "sync".to_string(), |entity| entity.to_string());
    let mut line = format!(
        "{entity} ({}): {} pages, {} items, {} inserted, {} updated, {} backfilled, {} conflicted, {} skipped",
        summary.table,
        summary.pages,
        summary.items,
        summary.inserted,
        summary.updated,
        summary.backfilled,
        summary.conflicted,
        summary.skipped,
    );
    if summary.skipped_blank > 0 {
        line.push_str(&format!(", {} blank", summary.skipped_blank));
    }
    if summary.placeholders > 0 {
        line.push_str(&format!(", {} placeholders", summary.placeholders));
    }
    if summary.dry_run {
        line.push_str(" [dry run]");
    }
    line
}

fn format_deep_line(label: &str, deep: &DeepSyncSummary) -> String {
    let mut line = format!("{label} for {} parents: ", deep.requested);
    line.push_str(&format_summary_line(&deep.totals));
    if deep.failed > 0 {
        line.push_str(&format!(" ({} failed)", deep.failed));
    }
    line
}

pub fn format_sync_all_lines(summary: &SyncAllSummary) -> Vec<String> {
    vec![
        format_summary_line(&summary.projects),
        format_summary_line(&summary.people),
        format_summary_line(&summary.experiments),
        format_deep_line("comments", &summary.project_comments),
        format_deep_line("runs", &summary.experiment_runs),
    ]
}

pub fn format_watermark(watermark: &Watermark) -> String {
    if watermark.is_empty() {
        return "(start)".to_string();
    }
    let time = watermark
        .time
        .as_ref()
        .map_or_else(|| "-".to_string(), format_cursor_timestamp);
    let pk = watermark
        .pk
        .map_or_else(|| "-".to_string(), |pk| pk.to_string());
    format!("since={time} since_pk={pk}")
}

pub fn format_cursor_lines(cursors: &[SyncCursor]) -> Vec<String> {
    cursors
        .iter()
        .map(|cursor| {
            format!(
                "{:<24} {}  (updated {})",
                cursor.table_name,
                format_watermark(&cursor.watermark),
                format_cursor_timestamp(&cursor.modified_at)
            )
        })
        .collect()
}
