//! labsync CLI - run legacy sync passes against the local database
//!
//! Connection settings come from flags, `LABSYNC_*` environment variables
//! (a `.env` file is honoured), or `~/.labsync/legacy.conf`.

mod cli;
mod commands;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, CursorCommands};
use crate::commands::common::{resolve_db_path, Target};
use crate::commands::cursor::{run_cursor_reset, run_cursor_show};
use crate::commands::sync::{run_sync, run_sync_all, sync_all_request, sync_request};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("labsync=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let target = Target {
        db_path: resolve_db_path(cli.db_path)?,
        legacy_url: cli.legacy_url,
        mapping_path: cli.mapping,
    };

    match cli.command {
        Commands::Sync {
            entity,
            id,
            pass,
            backfill_missing,
            json,
        } => {
            let request = sync_request(entity, id, &pass, backfill_missing, &target);
            run_sync(&request, json).await?;
        }
        Commands::SyncAll {
            pass,
            no_backfill,
            max_project_comments,
            max_experiment_runs,
            json,
        } => {
            let request = sync_all_request(
                &pass,
                no_backfill,
                max_project_comments,
                max_experiment_runs,
                &target,
            );
            run_sync_all(&request, json).await?;
        }
        Commands::Cursor { command } => match command {
            CursorCommands::Show { json } => run_cursor_show(json, &target.db_path)?,
            CursorCommands::Reset { entity } => {
                run_cursor_reset(entity, target.mapping_path.as_deref(), &target.db_path)?;
            }
        },
    }

    Ok(())
}
