//! Versioned schema migrations.
//!
//! Applied versions are recorded in `_migrations`; each pending step runs
//! in its own transaction together with its bookkeeping row.

use rusqlite::{params, Connection};

use super::error::DatabaseError;

struct Migration {
    version: u32,
    name: &'static str,
    step: Step,
}

enum Step {
    Sql(&'static str),
    /// Tolerates databases where the column was added by hand.
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

const CREATE_HISTORY: &str = "
CREATE TABLE IF NOT EXISTS history (
    id TEXT PRIMARY KEY NOT NULL,
    job_id TEXT,
    file_name TEXT NOT NULL,
    mime_type TEXT,
    text TEXT NOT NULL,
    parsed TEXT,
    usage TEXT NOT NULL,
    estimated_cost REAL NOT NULL DEFAULT 0,
    thumbnail BLOB,
    blob_path TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_history_created_at ON history (created_at);
CREATE INDEX IF NOT EXISTS idx_history_job_id ON history (job_id);
";

const CREATE_NOTIFICATIONS: &str = "
CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY NOT NULL,
    payload TEXT NOT NULL,
    read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_notifications_created_at ON notifications (created_at);
";

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "history",
        step: Step::Sql(CREATE_HISTORY),
    },
    Migration {
        version: 2,
        name: "notifications",
        step: Step::Sql(CREATE_NOTIFICATIONS),
    },
    Migration {
        version: 3,
        name: "history_blob_size",
        step: Step::AddColumn {
            table: "history",
            column: "blob_size",
            definition: "INTEGER",
        },
    },
];

pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let applied = schema_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        apply(conn, migration).map_err(|e| DatabaseError::Migration {
            version: migration.version,
            reason: e.to_string(),
        })?;
        log::info!("Applied migration v{} ({})", migration.version, migration.name);
    }
    Ok(())
}

/// Highest applied migration version, 0 for a fresh database.
pub fn schema_version(conn: &Connection) -> Result<u32, DatabaseError> {
    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )?;
    Ok(version)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    match &migration.step {
        Step::Sql(sql) => tx.execute_batch(sql)?,
        Step::AddColumn {
            table,
            column,
            definition,
        } => {
            if column_exists(&tx, table, column)? {
                log::debug!("Column {}.{} already present", table, column);
            } else {
                tx.execute_batch(&format!(
                    "ALTER TABLE {} ADD COLUMN {} {};",
                    table, column, definition
                ))?;
            }
        }
    }
    tx.execute(
        "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
        params![migration.version, migration.name],
    )?;
    tx.commit()?;
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool, DatabaseError> {
    let found: u32 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(found > 0)
}
