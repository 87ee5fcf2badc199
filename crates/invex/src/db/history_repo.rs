//! History repository: CRUD operations for the `history` table.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DatabaseError};

/// A raw history row from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    pub id: String,
    pub job_id: Option<String>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub text: String,
    /// JSON-encoded parse of `text`, when it parsed.
    pub parsed: Option<String>,
    /// JSON-encoded usage record.
    pub usage: String,
    pub estimated_cost: f64,
    pub thumbnail: Option<Vec<u8>>,
    pub blob_path: Option<String>,
    pub blob_size: Option<i64>,
    pub created_at: String,
}

impl HistoryRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            job_id: row.get("job_id")?,
            file_name: row.get("file_name")?,
            mime_type: row.get("mime_type")?,
            text: row.get("text")?,
            parsed: row.get("parsed")?,
            usage: row.get("usage")?,
            estimated_cost: row.get("estimated_cost")?,
            thumbnail: row.get("thumbnail")?,
            blob_path: row.get("blob_path")?,
            blob_size: row.get("blob_size")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a new history row.
pub fn insert(db: &Database, row: &HistoryRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO history (id, job_id, file_name, mime_type, text, parsed, usage,
             estimated_cost, thumbnail, blob_path, blob_size, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                row.id,
                row.job_id,
                row.file_name,
                row.mime_type,
                row.text,
                row.parsed,
                row.usage,
                row.estimated_cost,
                row.thumbnail,
                row.blob_path,
                row.blob_size,
                row.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Records where a history item's original bytes were written.
/// Returns false when no row has that id.
pub fn set_blob(
    db: &Database,
    id: &str,
    blob_path: &str,
    blob_size: i64,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE history SET blob_path = ?2, blob_size = ?3 WHERE id = ?1",
            params![id, blob_path, blob_size],
        )?;
        Ok(changed > 0)
    })
}

/// Finds a history row by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<HistoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM history WHERE id = ?1",
                params![id],
                HistoryRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists history rows, newest first.
pub fn list(db: &Database, limit: u64, offset: u64) -> Result<Vec<HistoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM history ORDER BY created_at DESC, rowid DESC LIMIT ?1 OFFSET ?2",
        )?;
        let rows = stmt
            .query_map(params![limit as i64, offset as i64], HistoryRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Total number of history rows.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM history", [], |r| r.get(0))?;
        Ok(count as u64)
    })
}

/// Deletes a history row. Returns false when no row had that id.
pub fn delete(db: &Database, id: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute("DELETE FROM history WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    })
}
