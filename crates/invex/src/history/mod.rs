//! Persisted store of successful extractions.

pub mod blob;
pub mod store;
pub mod thumbnail;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::document::InputFile;
use crate::error::StorageError;
use crate::extraction::ExtractionUsage;

pub use blob::BlobStorage;
pub use store::SqliteHistoryStore;
pub use thumbnail::{create_thumbnail, thumbnail_for};

/// Errors from saving or reading history.
#[derive(Error, Debug)]
pub enum HistoryError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("History item not found: {0}")]
    NotFound(String),

    #[error("History item {id} has no stored file")]
    NoBlob { id: String },

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Record to save for one successful extraction.
#[derive(Debug, Clone)]
pub struct NewHistoryItem {
    pub job_id: Option<String>,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub text: String,
    pub parsed: Option<serde_json::Value>,
    pub usage: ExtractionUsage,
    /// PNG bytes.
    pub thumbnail: Option<Vec<u8>>,
}

/// A saved history record.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub file_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    pub text: String,
    pub parsed: Option<serde_json::Value>,
    pub usage: ExtractionUsage,
    #[serde(skip)]
    pub thumbnail: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persists successful extractions, one record and one blob per document.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Saves the record and returns it with its assigned id.
    async fn save_history_item(&self, item: NewHistoryItem) -> Result<HistoryItem, HistoryError>;

    /// Stores the original document bytes for an already saved record.
    async fn save_file_blob(&self, id: &str, file: &InputFile) -> Result<(), HistoryError>;
}
