use std::path::Path;

use labsync_core::config::MappingSet;
use labsync_core::db::{CursorStore, Database, SqliteCursorStore};
use labsync_core::EntityKind;

use crate::commands::common::format_cursor_lines;
use crate::error::CliError;

pub fn run_cursor_show(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = Database::open(db_path)?;
    let cursors = SqliteCursorStore::new(db.connection()).list()?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&cursors)?);
    } else if cursors.is_empty() {
        println!("No sync cursors yet");
    } else {
        for line in format_cursor_lines(&cursors) {
            println!("{line}");
        }
    }
    Ok(())
}

/// Clear the cursor of `entity` and return the legacy table it belongs to.
pub fn reset_cursor(
    entity: EntityKind,
    mapping_path: Option<&Path>,
    db_path: &Path,
) -> Result<String, CliError> {
    let mapping = MappingSet::load(mapping_path)?;
    let table = mapping.plan(entity)?.remote_table.clone();

    let db = Database::open(db_path)?;
    SqliteCursorStore::new(db.connection()).reset(&table)?;
    tracing::info!(%entity, table = %table, "Reset legacy sync cursor");
    Ok(table)
}

pub fn run_cursor_reset(
    entity: EntityKind,
    mapping_path: Option<&Path>,
    db_path: &Path,
) -> Result<(), CliError> {
    let table = reset_cursor(entity, mapping_path, db_path)?;
    println!("Reset cursor for {entity} ({table})");
    Ok(())
}
