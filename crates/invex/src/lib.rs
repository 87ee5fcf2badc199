pub mod batch;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod extraction;
pub mod history;
pub mod jobs;
pub mod logging;
pub mod notifications;
pub mod pdf;
pub mod secrets;

pub use batch::{
    process_batch, BatchError, BatchFileResult, BatchOptions, FileStatus, RateLimiter,
};
pub use config::{load_config, load_config_from_str, Config};
pub use db::{Database, DatabaseError};
pub use document::InputFile;
pub use error::{ConfigError, InvexError, Result, StorageError};
pub use extraction::{
    Extraction, ExtractionClient, ExtractionError, ExtractionUsage, HttpExtractionClient,
    HttpExtractionConfig, PricingTable,
};
pub use history::{HistoryError, HistoryItem, HistoryStore, NewHistoryItem, SqliteHistoryStore};
pub use jobs::{
    normalize, BatchSummary, Job, JobManager, JobManagerBuilder, JobManagerConfig, JobProgress,
    JobStatus, NormalizedResult,
};
pub use logging::{init_logging, LogFormat};
pub use notifications::{
    FileIssue, NewNotification, Notification, NotificationEvent, NotificationFeed,
    NotificationStore, NotificationUpdate,
};
pub use pdf::{
    count_invoices, page_count, page_groups, prepare_files, split_by_pages, FileSelection,
    SplitError,
};
pub use secrets::{resolve_secret, SecretError};
