//! SQLite storage shared by the history store and the notification feed.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

pub mod error;
pub mod history_repo;
pub mod migrations;
pub mod notification_repo;

pub use error::DatabaseError;

const DATABASE_FILE: &str = "invex.db";

/// Shared handle to one SQLite connection; clones share the connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens or creates the database file, creating its directory and
    /// applying pending migrations.
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| DatabaseError::Io {
                path: dir.to_path_buf(),
                source: e,
            })?;
        }

        let conn = Connection::open(path)?;
        // journal_mode returns a row, so it cannot go through execute_batch.
        let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        log::debug!("SQLite journal mode: {}", mode);

        let db = Self::prepare(conn)?;
        log::info!("Opened database {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self, DatabaseError> {
        conn.pragma_update(None, "foreign_keys", true)?;
        migrations::run_all(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs `f` while holding the connection lock.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Connection) -> Result<T, DatabaseError>,
    {
        let guard = match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Database connection lock was poisoned, recovering");
                poisoned.into_inner()
            }
        };
        f(&guard)
    }

    /// Runs `f` on the blocking thread pool, for callers on async tasks.
    pub async fn run_blocking<F, T>(&self, f: F) -> Result<T, DatabaseError>
    where
        F: FnOnce(&Database) -> Result<T, DatabaseError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| DatabaseError::Task(e.to_string()))?
    }
}

pub fn database_path(data_directory: &Path) -> PathBuf {
    data_directory.join(DATABASE_FILE)
}

/// `~/.invex`, or `None` when the home directory is unknown.
pub fn default_data_directory() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".invex"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let db = Database::open_in_memory().unwrap();
        let poisoner = db.clone();
        let result = std::thread::spawn(move || {
            poisoner.with_conn(|_| -> Result<(), DatabaseError> { panic!("writer died") })
        })
        .join();
        assert!(result.is_err());
        assert!(db.conn.is_poisoned());

        let count = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| {
                    r.get::<_, u32>(0)
                })?)
            })
            .unwrap();
        assert!(count > 0);
    }

    #[tokio::test]
    async fn test_run_blocking_uses_same_connection() {
        let db = Database::open_in_memory().unwrap();
        db.run_blocking(|db| {
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO notifications (id, payload, read, created_at, updated_at)
                     VALUES ('n1', '{}', 0, '2026-01-01', '2026-01-01')",
                    [],
                )?;
                Ok(())
            })
        })
        .await
        .unwrap();

        let count: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            let count: u32 =
                conn.query_row("SELECT COUNT(*) FROM _migrations", [], |r| r.get(0))?;
            assert!(count > 0);
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn test_open_file_db_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = database_path(&dir.path().join("nested"));
        let db = Database::open(&path).unwrap();
        db.with_conn(|conn| {
            let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?;
            assert_eq!(mode.to_lowercase(), "wal");
            Ok(())
        })
        .unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("invex.db");
        {
            let db = Database::open(&path).unwrap();
            db.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO notifications (id, payload, read, created_at, updated_at)
                     VALUES ('n1', '{}', 0, '2026-01-01', '2026-01-01')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        }
        let db = Database::open(&path).unwrap();
        let count: u32 = db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_default_data_directory() {
        let dir = default_data_directory().unwrap();
        assert!(dir.ends_with(".invex"));
    }
}
