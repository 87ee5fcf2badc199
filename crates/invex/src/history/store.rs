//! SQLite-backed [`HistoryStore`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{BlobStorage, HistoryError, HistoryItem, HistoryStore, NewHistoryItem};
use crate::db::history_repo::{self, HistoryRow};
use crate::db::{database_path, Database, DatabaseError};
use crate::document::InputFile;
use crate::extraction::ExtractionUsage;

/// History records in SQLite, original documents in a blob directory.
#[derive(Debug, Clone)]
pub struct SqliteHistoryStore {
    db: Database,
    blobs: BlobStorage,
}

impl SqliteHistoryStore {
    pub fn new(db: Database, blob_directory: impl AsRef<Path>) -> Self {
        Self {
            db,
            blobs: BlobStorage::new(blob_directory),
        }
    }

    /// Opens the database and blob directory under `data_directory`.
    pub fn open(data_directory: &Path) -> Result<Self, HistoryError> {
        let db = Database::open(&database_path(data_directory))?;
        Ok(Self::new(db, data_directory.join("blobs")))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Lists saved items, newest first.
    pub fn list(&self, limit: u64, offset: u64) -> Result<Vec<HistoryItem>, HistoryError> {
        history_repo::list(&self.db, limit, offset)?
            .into_iter()
            .map(from_row)
            .collect()
    }

    pub fn count(&self) -> Result<u64, HistoryError> {
        Ok(history_repo::count(&self.db)?)
    }

    pub fn get(&self, id: &str) -> Result<Option<HistoryItem>, HistoryError> {
        history_repo::find_by_id(&self.db, id)?
            .map(from_row)
            .transpose()
    }

    /// Reads the stored original document of an item.
    pub fn read_blob(&self, id: &str) -> Result<Vec<u8>, HistoryError> {
        let row = history_repo::find_by_id(&self.db, id)?
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))?;
        let path = row
            .blob_path
            .ok_or_else(|| HistoryError::NoBlob { id: id.to_string() })?;
        Ok(self.blobs.read(Path::new(&path))?)
    }

    /// Deletes an item and its blob. Returns false for unknown ids.
    pub fn delete(&self, id: &str) -> Result<bool, HistoryError> {
        let Some(row) = history_repo::find_by_id(&self.db, id)? else {
            return Ok(false);
        };
        if let Some(path) = row.blob_path {
            self.blobs.remove(Path::new(&path))?;
        }
        Ok(history_repo::delete(&self.db, id)?)
    }
}

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    async fn save_history_item(&self, item: NewHistoryItem) -> Result<HistoryItem, HistoryError> {
        let saved = HistoryItem {
            id: Uuid::new_v4().to_string(),
            job_id: item.job_id,
            file_name: item.file_name,
            mime_type: item.mime_type,
            text: item.text,
            parsed: item.parsed,
            usage: item.usage,
            thumbnail: item.thumbnail,
            blob_path: None,
            created_at: Utc::now(),
        };

        let row = to_row(&saved)?;
        self.db
            .run_blocking(move |db| history_repo::insert(db, &row))
            .await?;
        log::debug!("Saved history item {} for '{}'", saved.id, saved.file_name);
        Ok(saved)
    }

    async fn save_file_blob(&self, id: &str, file: &InputFile) -> Result<(), HistoryError> {
        let lookup = id.to_string();
        let existing = self
            .db
            .run_blocking(move |db| history_repo::find_by_id(db, &lookup))
            .await?;
        if existing.is_none() {
            return Err(HistoryError::NotFound(id.to_string()));
        }

        let blobs = self.blobs.clone();
        let stem = id.to_string();
        let (_, extension) = file.split_name();
        let extension = extension.to_lowercase();
        let source = file.clone();
        let path: PathBuf =
            tokio::task::spawn_blocking(move || blobs.store(&stem, &extension, source.bytes()))
                .await
                .map_err(|e| HistoryError::Task(e.to_string()))??;

        let path_str = path.to_string_lossy().to_string();
        let (row_id, blob_path, blob_size) = (id.to_string(), path_str.clone(), file.size as i64);
        self.db
            .run_blocking(move |db| history_repo::set_blob(db, &row_id, &blob_path, blob_size))
            .await?;
        log::debug!("Stored blob for history item {} at {}", id, path_str);
        Ok(())
    }
}

fn to_row(item: &HistoryItem) -> Result<HistoryRow, DatabaseError> {
    let parsed = item
        .parsed
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::Json {
            column: "parsed",
            source: e,
        })?;
    let usage = serde_json::to_string(&item.usage).map_err(|e| DatabaseError::Json {
        column: "usage",
        source: e,
    })?;

    Ok(HistoryRow {
        id: item.id.clone(),
        job_id: item.job_id.clone(),
        file_name: item.file_name.clone(),
        mime_type: item.mime_type.clone(),
        text: item.text.clone(),
        parsed,
        usage,
        estimated_cost: item.usage.estimated_cost,
        thumbnail: item.thumbnail.clone(),
        blob_path: item.blob_path.clone(),
        blob_size: None,
        created_at: item.created_at.to_rfc3339(),
    })
}

fn from_row(row: HistoryRow) -> Result<HistoryItem, HistoryError> {
    let parsed = row
        .parsed
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .map_err(|e| DatabaseError::Json {
            column: "parsed",
            source: e,
        })?;
    let usage: ExtractionUsage = serde_json::from_str(&row.usage).map_err(|e| DatabaseError::Json {
        column: "usage",
        source: e,
    })?;
    let created_at = DateTime::parse_from_rfc3339(&row.created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("Bad created_at '{}' on history item {}: {}", row.created_at, row.id, e);
            Utc::now()
        });

    Ok(HistoryItem {
        id: row.id,
        job_id: row.job_id,
        file_name: row.file_name,
        mime_type: row.mime_type,
        text: row.text,
        parsed,
        usage,
        thumbnail: row.thumbnail,
        blob_path: row.blob_path,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn new_item(name: &str) -> NewHistoryItem {
        NewHistoryItem {
            job_id: Some("job-1".to_string()),
            file_name: name.to_string(),
            mime_type: Some("application/pdf".to_string()),
            text: "{\"total\":12}".to_string(),
            parsed: Some(serde_json::json!({"total": 12})),
            usage: ExtractionUsage {
                input_tokens: 100,
                output_tokens: 20,
                total_tokens: 120,
                estimated_cost: 0.001,
                ..Default::default()
            },
            thumbnail: None,
        }
    }

    fn store(temp: &TempDir) -> SqliteHistoryStore {
        SqliteHistoryStore::open(temp.path()).unwrap()
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);

        let saved = store.save_history_item(new_item("a.pdf")).await.unwrap();
        let loaded = store.get(&saved.id).unwrap().unwrap();

        assert_eq!(loaded.file_name, "a.pdf");
        assert_eq!(loaded.parsed, Some(serde_json::json!({"total": 12})));
        assert_eq!(loaded.usage, saved.usage);
        assert!(loaded.blob_path.is_none());
        assert!(store.get("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blob_round_trip_and_delete() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let file = InputFile::new("Invoice.PDF", b"%PDF-1.5 body".to_vec());

        let saved = store.save_history_item(new_item("Invoice.PDF")).await.unwrap();
        store.save_file_blob(&saved.id, &file).await.unwrap();

        let loaded = store.get(&saved.id).unwrap().unwrap();
        let blob_path = PathBuf::from(loaded.blob_path.unwrap());
        assert!(blob_path.starts_with(temp.path().join("blobs")));
        assert!(blob_path.to_string_lossy().ends_with(".pdf"));
        assert_eq!(store.read_blob(&saved.id).unwrap(), b"%PDF-1.5 body");

        assert!(store.delete(&saved.id).unwrap());
        assert!(!blob_path.exists());
        assert!(!store.delete(&saved.id).unwrap());
    }

    #[tokio::test]
    async fn test_blob_for_unknown_item_fails() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let file = InputFile::new("a.pdf", vec![1]);

        let err = store.save_file_blob("nope", &file).await.unwrap_err();
        assert!(matches!(err, HistoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_read_blob_without_blob() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let saved = store.save_history_item(new_item("a.pdf")).await.unwrap();
        assert!(matches!(
            store.read_blob(&saved.id),
            Err(HistoryError::NoBlob { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let temp = TempDir::new().unwrap();
        let store = store(&temp);
        let first = store.save_history_item(new_item("first.pdf")).await.unwrap();
        let second = store.save_history_item(new_item("second.pdf")).await.unwrap();

        let items = store.list(10, 0).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, second.id);
        assert_eq!(items[1].id, first.id);
        assert_eq!(store.count().unwrap(), 2);
    }
}
