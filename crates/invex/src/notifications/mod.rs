//! User-visible status cards mirroring job lifecycles.

pub mod feed;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::{JobProgress, JobStatus};

pub use feed::{NotificationEvent, NotificationFeed};

/// A file name paired with the reason it did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIssue {
    pub name: String,
    pub error: String,
}

/// One status card, usually paired with a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: JobStatus,
    pub progress: JobProgress,
    #[serde(default)]
    pub items_processed: usize,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub success_files: Vec<String>,
    #[serde(default)]
    pub file_failures: Vec<FileIssue>,
    #[serde(default)]
    pub cancelled_files: Vec<FileIssue>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// Fields for a new notification; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub job_id: Option<String>,
    pub title: String,
    pub description: String,
    pub status: JobStatus,
    pub progress: JobProgress,
}

/// Partial update: only the fields that are `Some` change.
#[derive(Debug, Clone, Default)]
pub struct NotificationUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<JobStatus>,
    pub progress: Option<JobProgress>,
    pub items_processed: Option<usize>,
    pub total_cost: Option<f64>,
    pub success_files: Option<Vec<String>>,
    pub file_failures: Option<Vec<FileIssue>>,
    pub cancelled_files: Option<Vec<FileIssue>>,
    pub read: Option<bool>,
}

impl Notification {
    pub(crate) fn create(id: String, input: NewNotification) -> Self {
        Self {
            id,
            job_id: input.job_id,
            title: input.title,
            description: input.description,
            status: input.status,
            progress: input.progress,
            items_processed: 0,
            total_cost: 0.0,
            success_files: Vec::new(),
            file_failures: Vec::new(),
            cancelled_files: Vec::new(),
            timestamp: Utc::now(),
            read: false,
        }
    }

    /// Applies the `Some` fields of `update`.
    pub fn apply(&mut self, update: NotificationUpdate) {
        if let Some(title) = update.title {
            self.title = title;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(progress) = update.progress {
            self.progress = progress;
        }
        if let Some(items) = update.items_processed {
            self.items_processed = items;
        }
        if let Some(cost) = update.total_cost {
            self.total_cost = cost;
        }
        if let Some(files) = update.success_files {
            self.success_files = files;
        }
        if let Some(failures) = update.file_failures {
            self.file_failures = failures;
        }
        if let Some(cancelled) = update.cancelled_files {
            self.cancelled_files = cancelled;
        }
        if let Some(read) = update.read {
            self.read = read;
        }
    }
}

/// Keyed feed of notifications, written by the job manager.
///
/// Both calls are fire-and-observe: storage problems are logged by the
/// implementation, never returned to the caller.
pub trait NotificationStore: Send + Sync {
    /// Adds a notification and returns its id.
    fn add_notification(&self, input: NewNotification) -> String;

    /// Updates an existing notification. Unknown ids are ignored.
    fn update_notification(&self, id: &str, update: NotificationUpdate);
}
