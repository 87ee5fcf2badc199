use std::path::PathBuf;

use invex::jobs::JobStatus;
use thiserror::Error;

use crate::selection::SelectionError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Invex(#[from] invex::InvexError),

    #[error(transparent)]
    Config(#[from] invex::ConfigError),

    #[error(transparent)]
    Storage(#[from] invex::StorageError),

    #[error(transparent)]
    Split(#[from] invex::SplitError),

    #[error(transparent)]
    Extraction(#[from] invex::ExtractionError),

    #[error(transparent)]
    History(#[from] invex::HistoryError),

    #[error(transparent)]
    Secret(#[from] invex::SecretError),

    #[error(transparent)]
    Database(#[from] invex::DatabaseError),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error("Config file '{0}' not found; this command needs an api section")]
    MissingConfig(PathBuf),

    #[error("Failed to write '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to install Ctrl-C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("Failed to render output: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No {kind} with id '{id}'")]
    NotFound { kind: &'static str, id: String },

    #[error("Job {id} ended with status {status}")]
    JobEnded { id: String, status: JobStatus },
}
