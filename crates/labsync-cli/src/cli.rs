use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use labsync_core::sync::{
    FieldsMode, DEFAULT_MAX_EXPERIMENT_RUNS, DEFAULT_MAX_PROJECT_COMMENTS, DEFAULT_PAGE_LIMIT,
};
use labsync_core::EntityKind;

#[derive(Parser)]
#[command(name = "labsync")]
#[command(about = "Incrementally sync the legacy lab-management service into a local database")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Legacy service base URL (overrides LABSYNC_LEGACY_URL and the config file)
    #[arg(long, global = true, value_name = "URL")]
    pub legacy_url: Option<String>,

    /// Field mapping document to use instead of the built-in one
    #[arg(long, global = true, value_name = "PATH")]
    pub mapping: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync one entity from the legacy service
    Sync {
        /// Entity to sync (projects, people, experiments, experiment-runs, project-comments)
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,
        /// Sync only the rows whose legacy primary key is this id
        #[arg(long, value_name = "ID")]
        id: Option<i64>,
        #[command(flatten)]
        pass: PassArgs,
        /// Fill empty local columns of locally edited rows
        #[arg(long)]
        backfill_missing: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sync projects, people and experiments, then comments and runs of the touched parents
    SyncAll {
        #[command(flatten)]
        pass: PassArgs,
        /// Leave locally edited rows untouched instead of filling their empty columns
        #[arg(long)]
        no_backfill: bool,
        /// Number of touched projects whose comments are refreshed
        #[arg(long, default_value_t = DEFAULT_MAX_PROJECT_COMMENTS)]
        max_project_comments: usize,
        /// Number of touched experiments whose runs are refreshed
        #[arg(long, default_value_t = DEFAULT_MAX_EXPERIMENT_RUNS)]
        max_experiment_runs: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect or reset sync cursors
    Cursor {
        #[command(subcommand)]
        command: CursorCommands,
    },
}

/// Paging options shared by `sync` and `sync-all`
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct PassArgs {
    /// Rows per page
    #[arg(short, long, default_value_t = DEFAULT_PAGE_LIMIT)]
    pub limit: usize,
    /// Field list encoding (repeat, csv, omit); negotiated when not given
    #[arg(long, value_name = "MODE", value_parser = parse_fields_mode)]
    pub fields_mode: Option<FieldsMode>,
    /// Stop after this many pages per entity pass
    #[arg(long, value_name = "N")]
    pub max_pages: Option<usize>,
    /// Start over from the beginning of each table
    #[arg(long)]
    pub reset_cursor: bool,
    /// Fetch and apply, then roll everything back
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Subcommand)]
pub enum CursorCommands {
    /// List stored cursors
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear the cursor of one entity so its next sync starts over
    Reset {
        #[arg(value_parser = parse_entity)]
        entity: EntityKind,
    },
}

fn parse_entity(raw: &str) -> Result<EntityKind, String> {
    raw.parse()
}

fn parse_fields_mode(raw: &str) -> Result<FieldsMode, String> {
    raw.parse()
}
