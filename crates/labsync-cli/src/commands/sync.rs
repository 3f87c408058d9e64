use labsync_core::config::LegacyEnv;
use labsync_core::sync::{self, SyncAllRequest, SyncRequest};
use labsync_core::EntityKind;

use crate::cli::PassArgs;
use crate::commands::common::{
    default_legacy_conf_path, format_summary_line, format_sync_all_lines, Target,
};
use crate::error::CliError;

pub fn sync_request(
    entity: EntityKind,
    id: Option<i64>,
    pass: &PassArgs,
    backfill_missing: bool,
    target: &Target,
) -> SyncRequest {
    SyncRequest {
        id,
        legacy_url: target.legacy_url.clone(),
        mapping_path: target.mapping_path.clone(),
        limit: pass.limit,
        fields_mode: pass.fields_mode,
        max_pages: pass.max_pages,
        reset_cursor: pass.reset_cursor,
        dry_run: pass.dry_run,
        backfill_missing,
        ..SyncRequest::new(entity, target.db_path.clone())
    }
}

pub fn sync_all_request(
    pass: &PassArgs,
    no_backfill: bool,
    max_project_comments: usize,
    max_experiment_runs: usize,
    target: &Target,
) -> SyncAllRequest {
    SyncAllRequest {
        legacy_url: target.legacy_url.clone(),
        mapping_path: target.mapping_path.clone(),
        limit: pass.limit,
        fields_mode: pass.fields_mode,
        max_pages: pass.max_pages,
        reset_cursor: pass.reset_cursor,
        dry_run: pass.dry_run,
        backfill_missing: !no_backfill,
        max_project_comments,
        max_experiment_runs,
        ..SyncAllRequest::new(target.db_path.clone())
    }
}

pub async fn run_sync(request: &SyncRequest, as_json: bool) -> Result<(), CliError> {
    let conf_path = default_legacy_conf_path();
    let summary =
        sync::run_sync(request, &LegacyEnv::from_process(), conf_path.as_deref()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{}", format_summary_line(&summary));
    }
    Ok(())
}

pub async fn run_sync_all(request: &SyncAllRequest, as_json: bool) -> Result<(), CliError> {
    let conf_path = default_legacy_conf_path();
    let summary =
        sync::run_sync_all(request, &LegacyEnv::from_process(), conf_path.as_deref()).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_sync_all_lines(&summary) {
            println!("{line}");
        }
    }
    Ok(())
}
