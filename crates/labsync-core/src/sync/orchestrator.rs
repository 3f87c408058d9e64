//! Multi-entity sync: incremental parents, then per-parent child passes.

use rusqlite::Connection;

use super::driver::{Scope, SyncDriver, SyncOptions};
use super::transport::LegacyTransport;
use super::{DeepSyncSummary, SyncAllSummary, SyncSummary};
use crate::config::{FieldMappingPlan, MappingSet};
use crate::error::Result;
use crate::models::EntityKind;

pub const DEFAULT_MAX_PROJECT_COMMENTS: usize = 25;
pub const DEFAULT_MAX_EXPERIMENT_RUNS: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncAllOptions {
    pub sync: SyncOptions,
    /// Projects (from the incremental project pass) whose comments are fetched
    pub max_project_comments: usize,
    /// Experiments (from the incremental experiment pass) whose runs are fetched
    pub max_experiment_runs: usize,
}

impl Default for SyncAllOptions {
    fn default() -> Self {
        Self {
            sync: SyncOptions {
                backfill_missing: true,
                ..SyncOptions::default()
            },
            max_project_comments: DEFAULT_MAX_PROJECT_COMMENTS,
            max_experiment_runs: DEFAULT_MAX_EXPERIMENT_RUNS,
        }
    }
}

/// Sync projects, people and experiments incrementally, then refresh
/// comments and runs for the parents those passes touched.
///
/// A failing incremental pass aborts the run. A failing per-parent pass is
/// logged and counted; the remaining parents are still processed.
pub async fn sync_all<T: LegacyTransport>(
    conn: &Connection,
    transport: &T,
    mapping: &MappingSet,
    options: &SyncAllOptions,
) -> Result<SyncAllSummary> {
    let driver = SyncDriver::new(conn, transport, options.sync.clone());

    let projects = driver
        .run(mapping.plan(EntityKind::Projects)?, Scope::Incremental)
        .await?;
    let people = driver
        .run(mapping.plan(EntityKind::People)?, Scope::Incremental)
        .await?;
    let experiments = driver
        .run(mapping.plan(EntityKind::Experiments)?, Scope::Incremental)
        .await?;

    let project_comments = deep_sync(
        &driver,
        mapping.plan(EntityKind::ProjectComments)?,
        &projects.touched_ids,
        options.max_project_comments,
    )
    .await;
    let experiment_runs = deep_sync(
        &driver,
        mapping.plan(EntityKind::ExperimentRuns)?,
        &experiments.touched_ids,
        options.max_experiment_runs,
    )
    .await;

    tracing::info!(
        projects = projects.items,
        people = people.items,
        experiments = experiments.items,
        comment_parents = project_comments.requested,
        run_parents = experiment_runs.requested,
        failed = project_comments.failed + experiment_runs.failed,
        "Finished legacy sync-all"
    );

    Ok(SyncAllSummary {
        projects,
        people,
        experiments,
        project_comments,
        experiment_runs,
    })
}

async fn deep_sync<T: LegacyTransport>(
    driver: &SyncDriver<'_, T>,
    plan: &FieldMappingPlan,
    parent_ids: &[i64],
    max_parents: usize,
) -> DeepSyncSummary {
    let mut summary = DeepSyncSummary {
        totals: SyncSummary::new(plan.entity, plan.remote_table.as_str(), driver.options().dry_run),
        ..DeepSyncSummary::default()
    };

    for &parent_id in parent_ids.iter().take(max_parents) {
        summary.requested += 1;
        match driver.run(plan, Scope::Single(parent_id)).await {
            Ok(pass) => summary.totals.absorb(&pass),
            Err(error) => {
                tracing::warn!(
                    entity = %plan.entity,
                    parent_id,
                    %error,
                    "Per-parent sync pass failed"
                );
                summary.failed += 1;
            }
        }
    }
    summary
}
