//! Database migrations

use rusqlite::Connection;

use crate::error::Result;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

/// Migration to version 1: synchronized entities
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS project (
            id INTEGER PRIMARY KEY,
            added_by TEXT NOT NULL DEFAULT '',
            title TEXT NOT NULL DEFAULT '',
            description TEXT,
            project_type TEXT,
            display_id TEXT,
            display_title TEXT,
            status TEXT,
            pi TEXT,
            lab_contact TEXT,
            lab_personnel TEXT,
            core_leader TEXT,
            services_type TEXT,
            services TEXT,
            grant_support TEXT,
            background TEXT,
            samples TEXT,
            sample_type TEXT,
            comments_general TEXT,
            r_and_d INTEGER NOT NULL DEFAULT 0,
            current_flag INTEGER NOT NULL DEFAULT 0,
            billing_ready INTEGER NOT NULL DEFAULT 0,
            payment_received INTEGER NOT NULL DEFAULT 0,
            exp_count INTEGER NOT NULL DEFAULT 0,
            exp_run_count INTEGER NOT NULL DEFAULT 0,
            ms_files_count INTEGER NOT NULL DEFAULT 0,
            ms_run_time REAL NOT NULL DEFAULT 0,
            cost_minimum REAL NOT NULL DEFAULT 0,
            cost_maximum REAL,
            paid_price REAL,
            date_submitted TEXT,
            date_closed TEXT,
            invoice_date TEXT,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            imported_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_project_modified ON project(modified_at DESC);
        CREATE TABLE IF NOT EXISTS person (
            id INTEGER PRIMARY KEY,
            added_by TEXT NOT NULL DEFAULT '',
            first_name TEXT NOT NULL DEFAULT '',
            last_name TEXT NOT NULL DEFAULT '',
            domain TEXT,
            email TEXT,
            phone TEXT,
            pi TEXT,
            institution TEXT,
            center TEXT,
            department TEXT,
            status TEXT,
            roles TEXT,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            imported_at TEXT
        );
        CREATE TABLE IF NOT EXISTS experiment (
            id INTEGER PRIMARY KEY,
            project_id INTEGER REFERENCES project(id) ON DELETE CASCADE,
            record_no TEXT NOT NULL,
            added_by TEXT NOT NULL DEFAULT '',
            name TEXT,
            exp_type TEXT,
            label_flag INTEGER,
            lysis TEXT,
            dtt INTEGER,
            iaa INTEGER,
            description TEXT,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            imported_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_experiment_project ON experiment(project_id);
        CREATE TABLE IF NOT EXISTS experiment_run (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            experiment_id INTEGER NOT NULL REFERENCES experiment(id) ON DELETE CASCADE,
            run_no INTEGER NOT NULL DEFAULT 1,
            search_no INTEGER NOT NULL DEFAULT 1,
            added_by TEXT NOT NULL DEFAULT '',
            db_search_flag INTEGER NOT NULL DEFAULT 0,
            gpgrouper_flag INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            imported_at TEXT,
            UNIQUE (experiment_id, run_no, search_no)
        );
        CREATE TABLE IF NOT EXISTS project_comment (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            project_id INTEGER NOT NULL REFERENCES project(id) ON DELETE CASCADE,
            person_id INTEGER NOT NULL REFERENCES person(id),
            added_by TEXT NOT NULL DEFAULT '',
            comment_type TEXT,
            comment TEXT,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL,
            imported_at TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_project_comment_key
            ON project_comment(project_id, person_id, created_at);
        INSERT INTO schema_version (version) VALUES (1);
        COMMIT;",
    )
    .inspect_err(|_| {
        conn.execute_batch("ROLLBACK").ok();
    })?;

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: per-table sync cursors
fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "BEGIN;
        CREATE TABLE IF NOT EXISTS legacy_sync_state (
            legacy_table TEXT PRIMARY KEY,
            since TEXT,
            since_pk INTEGER,
            created_at TEXT NOT NULL,
            modified_at TEXT NOT NULL
        );
        INSERT INTO schema_version (version) VALUES (2);
        COMMIT;",
    )
    .inspect_err(|_| {
        conn.execute_batch("ROLLBACK").ok();
    })?;

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        let version = get_version(&conn).unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_create_entity_and_cursor_tables() {
        let conn = setup();
        run(&conn).unwrap();

        for table in [
            "project",
            "person",
            "experiment",
            "experiment_run",
            "project_comment",
            "legacy_sync_state",
        ] {
            assert!(table_exists(&conn, table), "missing table {table}");
        }
    }
}
