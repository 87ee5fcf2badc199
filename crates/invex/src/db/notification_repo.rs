//! Notification repository: CRUD operations for the `notifications` table.
//!
//! The notification itself is stored as a JSON payload; `read` and the
//! timestamps are kept as columns for filtering.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw notification row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRow {
    pub id: String,
    pub payload: String,
    pub read: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl NotificationRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            payload: row.get("payload")?,
            read: row.get("read")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Inserts or replaces a notification row.
pub fn upsert(db: &Database, row: &NotificationRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO notifications (id, payload, read, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                payload = excluded.payload,
                read = excluded.read,
                updated_at = excluded.updated_at",
            params![row.id, row.payload, row.read, row.created_at, row.updated_at],
        )?;
        Ok(())
    })
}

/// Finds a notification row by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<NotificationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM notifications WHERE id = ?1",
                params![id],
                NotificationRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists all notification rows, newest first.
pub fn list_all(db: &Database) -> Result<Vec<NotificationRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM notifications ORDER BY created_at DESC, rowid DESC")?;
        let rows = stmt
            .query_map([], NotificationRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Deletes a notification row. Returns false when no row had that id.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM notifications WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}

/// Deletes every notification row, returning how many were removed.
pub fn delete_all(db: &Database) -> Result<usize, DatabaseError> {
    db.with_conn(|conn| Ok(conn.execute("DELETE FROM notifications", [])?))
}
