//! Error types shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Any failure surfaced by the library.
#[derive(Error, Debug)]
pub enum InvexError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    Storage(#[from] StorageError),

    #[error("PDF split error: {0}")]
    Split(#[from] crate::pdf::SplitError),

    #[error("Extraction error: {0}")]
    Extraction(#[from] crate::extraction::ExtractionError),

    #[error("Batch error: {0}")]
    Batch(#[from] crate::batch::BatchError),

    #[error("History error: {0}")]
    History(#[from] crate::history::HistoryError),

    #[error("Secret error: {0}")]
    Secret(#[from] crate::secrets::SecretError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config is not valid JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Invalid config: {message}")]
    Validation { message: String },
}

/// Filesystem failures outside the database.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Cannot create directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot remove {path}: {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free file name left for {0}")]
    NameExhausted(String),
}

pub type Result<T> = std::result::Result<T, InvexError>;
