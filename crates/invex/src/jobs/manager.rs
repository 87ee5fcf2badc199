//! Job manager: creates jobs, drives their batches and mirrors their state
//! into the notification feed and history store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use super::job::{Job, JobProgress, JobStatus};
use super::normalize::normalize;
use crate::batch::{process_batch, BatchFileResult, BatchOptions, DEFAULT_MAX_CONCURRENT};
use crate::document::InputFile;
use crate::extraction::{Extraction, ExtractionClient};
use crate::history::{thumbnail_for, HistoryError, HistoryStore, NewHistoryItem};
use crate::notifications::{NewNotification, NotificationStore, NotificationUpdate};
use crate::pdf::{prepare_files, FileSelection, SplitError};

/// Called once when a job finishes through the normal completion path.
pub type JobCompleteCallback = Arc<dyn Fn(&Job) + Send + Sync>;

/// Settings passed explicitly into the manager.
#[derive(Debug, Clone)]
pub struct JobManagerConfig {
    pub max_concurrent: usize,
    /// Per-file watchdog; `None` disables it.
    pub file_timeout: Option<Duration>,
    /// Logs raw extraction payloads before normalization.
    pub developer_mode: bool,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            file_timeout: None,
            developer_mode: false,
        }
    }
}

/// Owns every job's lifecycle and cancellation token.
///
/// Cloning is cheap; clones share the same job table.
#[derive(Clone)]
pub struct JobManager {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn ExtractionClient>,
    notifications: Arc<dyn NotificationStore>,
    history: Arc<dyn HistoryStore>,
    config: JobManagerConfig,
    on_job_complete: Option<JobCompleteCallback>,
    jobs: RwLock<HashMap<String, Job>>,
    tokens: Mutex<HashMap<String, CancellationToken>>,
}

/// Builder for [`JobManager`].
pub struct JobManagerBuilder {
    client: Arc<dyn ExtractionClient>,
    notifications: Arc<dyn NotificationStore>,
    history: Arc<dyn HistoryStore>,
    config: JobManagerConfig,
    on_job_complete: Option<JobCompleteCallback>,
}

impl JobManagerBuilder {
    pub fn config(mut self, config: JobManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn on_job_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Job) + Send + Sync + 'static,
    {
        self.on_job_complete = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> JobManager {
        JobManager {
            inner: Arc::new(Inner {
                client: self.client,
                notifications: self.notifications,
                history: self.history,
                config: self.config,
                on_job_complete: self.on_job_complete,
                jobs: RwLock::new(HashMap::new()),
                tokens: Mutex::new(HashMap::new()),
            }),
        }
    }
}

impl JobManager {
    pub fn builder(
        client: Arc<dyn ExtractionClient>,
        notifications: Arc<dyn NotificationStore>,
        history: Arc<dyn HistoryStore>,
    ) -> JobManagerBuilder {
        JobManagerBuilder {
            client,
            notifications,
            history,
            config: JobManagerConfig::default(),
            on_job_complete: None,
        }
    }

    pub fn new(
        client: Arc<dyn ExtractionClient>,
        notifications: Arc<dyn NotificationStore>,
        history: Arc<dyn HistoryStore>,
        config: JobManagerConfig,
    ) -> Self {
        Self::builder(client, notifications, history)
            .config(config)
            .build()
    }

    pub fn config(&self) -> &JobManagerConfig {
        &self.inner.config
    }

    /// Creates a job for `files` and starts processing it in the background.
    /// Returns the job id.
    ///
    /// An empty batch completes before this returns, including the
    /// completion callback.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime with a non-empty batch.
    pub fn start_batch_job(&self, files: Vec<InputFile>) -> String {
        let job_id = Uuid::new_v4().to_string();
        let total = files.len();

        let initial_status = if total == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Processing
        };
        let notification_id = self.inner.notifications.add_notification(NewNotification {
            job_id: Some(job_id.clone()),
            title: title_for(initial_status, total),
            description: format!("0 of {} processed", total),
            status: initial_status,
            progress: JobProgress::new(0, total),
        });

        let mut job = Job::new(job_id.clone(), files.clone(), notification_id);

        if total == 0 {
            job.finish(JobStatus::Completed);
            self.write_jobs().insert(job_id.clone(), job.clone());
            self.publish(&job);
            log::info!("Job {} has no files, completed immediately", job_id);
            self.notify_complete(&job);
            return job_id;
        }

        log::info!("Starting job {} with {} file(s)", job_id, total);
        self.write_jobs().insert(job_id.clone(), job);

        let cancel = CancellationToken::new();
        self.lock_tokens().insert(job_id.clone(), cancel.clone());

        let manager = self.clone();
        let run_id = job_id.clone();
        tokio::spawn(async move { manager.run_job(run_id, files, cancel).await });

        job_id
    }

    /// Splits the selected PDFs into per-invoice files, then starts a job
    /// over the result. A split failure creates no job.
    pub fn start_selected_batch(
        &self,
        selections: Vec<FileSelection>,
    ) -> Result<String, SplitError> {
        let files = prepare_files(selections)?;
        Ok(self.start_batch_job(files))
    }

    /// Cancels a running job. Returns false when the job is unknown or
    /// already terminal; calling it again is a no-op.
    pub fn cancel_job(&self, job_id: &str) -> bool {
        let cancelled = self
            .update_job(job_id, |job| {
                if job.status.is_terminal() {
                    return None;
                }
                job.finish(JobStatus::Cancelled);
                Some(job.clone())
            })
            .flatten();

        let Some(job) = cancelled else {
            log::debug!("Cancel ignored for job {}: unknown or finished", job_id);
            return false;
        };

        // Removed before firing so the token can never be cancelled twice.
        if let Some(token) = self.take_token(job_id) {
            token.cancel();
        }

        log::info!(
            "Cancelled job {} at {}/{}",
            job_id,
            job.progress.current,
            job.progress.total
        );
        self.publish(&job);
        true
    }

    pub fn get_job(&self, job_id: &str) -> Option<Job> {
        self.read_jobs().get(job_id).cloned()
    }

    /// Number of jobs that are queued or processing.
    pub fn active_job_count(&self) -> usize {
        self.read_jobs()
            .values()
            .filter(|job| job.status.is_active())
            .count()
    }

    /// All jobs, oldest first.
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.read_jobs().values().cloned().collect();
        jobs.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        jobs
    }

    async fn run_job(self, job_id: String, files: Vec<InputFile>, cancel: CancellationToken) {
        let span = info_span!("job.run", job_id = %job_id, files = files.len());
        async move {
            let options = BatchOptions {
                max_concurrent: self.inner.config.max_concurrent,
                cancel,
                file_timeout: self.inner.config.file_timeout,
            };
            let client = Arc::clone(&self.inner.client);
            let progress = self.clone();
            let progress_id = job_id.clone();

            // A panic inside the batch surfaces here as a JoinError.
            let batch = tokio::spawn(async move {
                process_batch(client.as_ref(), &files, options, |current, total, results| {
                    progress.handle_progress(&progress_id, current, total, results)
                })
                .await
            });

            match batch.await {
                Ok(Ok(_)) => self.finish_job(&job_id).await,
                Ok(Err(e)) => self.fail_job(&job_id, e.to_string()),
                Err(e) => self.fail_job(&job_id, format!("Batch task failed: {}", e)),
            }
        }
        .instrument(span)
        .await
    }

    /// Folds one progress report into the job and republishes it.
    fn handle_progress(
        &self,
        job_id: &str,
        current: usize,
        total: usize,
        results: &[Option<BatchFileResult>],
    ) {
        let updated = self
            .update_job(job_id, |job| {
                job.record_progress(current, total, results);
                if job.status == JobStatus::Cancelled {
                    return None;
                }
                if current == total {
                    let status = job.settled_status();
                    job.finish(status);
                }
                Some(job.clone())
            })
            .flatten();

        if let Some(job) = updated {
            log::debug!("Job {} progress {}/{}", job_id, current, total);
            self.publish(&job);
        }
    }

    /// Normal completion: persist successes, release the token, notify.
    async fn finish_job(&self, job_id: &str) {
        let finished = self
            .update_job(job_id, |job| {
                if job.status == JobStatus::Cancelled {
                    return None;
                }
                if !job.status.is_terminal() {
                    let status = job.settled_status();
                    job.finish(status);
                }
                Some(job.clone())
            })
            .flatten();

        let Some(job) = finished else {
            log::info!("Job {} was cancelled, skipping history save", job_id);
            self.take_token(job_id);
            return;
        };

        self.publish(&job);
        self.persist_results(&job).await;
        self.take_token(job_id);

        let summary = job.summary();
        log::info!(
            "Job {} finished as {}: {} of {} succeeded",
            job_id,
            job.status,
            summary.succeeded(),
            job.progress.total
        );
        self.notify_complete(&job);
    }

    /// Whole-batch failure: the job fails with the error's message.
    fn fail_job(&self, job_id: &str, message: String) {
        log::error!("Job {} failed: {}", job_id, message);
        let failed = self
            .update_job(job_id, |job| {
                if job.status == JobStatus::Cancelled {
                    return None;
                }
                job.error = Some(message.clone());
                job.finish(JobStatus::Failed);
                Some(job.clone())
            })
            .flatten();

        self.take_token(job_id);
        if let Some(job) = failed {
            self.publish(&job);
            self.notify_complete(&job);
        }
    }

    async fn persist_results(&self, job: &Job) {
        for result in job.results.iter().flatten() {
            let Some(extraction) = &result.result else {
                continue;
            };
            if let Err(e) = self.persist_one(&job.id, &result.file, extraction).await {
                log::error!(
                    "Failed to save history for '{}' in job {}: {}",
                    result.file.name,
                    job.id,
                    e
                );
            }
        }
    }

    async fn persist_one(
        &self,
        job_id: &str,
        file: &InputFile,
        extraction: &Extraction,
    ) -> Result<(), HistoryError> {
        if self.inner.config.developer_mode {
            log::debug!("Raw extraction for '{}': {}", file.name, extraction.data);
        }

        let Some(normalized) = normalize(Some(&extraction.data)) else {
            log::warn!(
                "Empty extraction for '{}' in job {}, nothing to save",
                file.name,
                job_id
            );
            return Ok(());
        };
        if let Some(e) = &normalized.parse_error {
            log::warn!(
                "Result for '{}' in job {} is not valid JSON, saving text only: {}",
                file.name,
                job_id,
                e
            );
        }

        let thumbnail = thumbnail_for(file).await;
        let item = self
            .inner
            .history
            .save_history_item(NewHistoryItem {
                job_id: Some(job_id.to_string()),
                file_name: file.name.clone(),
                mime_type: file.mime_type.clone(),
                text: normalized.text,
                parsed: normalized.parsed,
                usage: extraction.usage.clone(),
                thumbnail,
            })
            .await?;
        self.inner.history.save_file_blob(&item.id, file).await?;
        Ok(())
    }

    /// Mirrors a job snapshot into its notification.
    fn publish(&self, job: &Job) {
        let summary = job.summary();
        let total = job.progress.total;
        let description = match (job.status, &job.error) {
            (JobStatus::Failed, Some(error)) => error.clone(),
            (status, _) if status.is_terminal() => {
                format!("{} of {} succeeded", summary.succeeded(), total)
            }
            _ => format!("{} of {} processed", job.progress.current, total),
        };

        self.inner.notifications.update_notification(
            &job.notification_id,
            NotificationUpdate {
                title: Some(title_for(job.status, total)),
                description: Some(description),
                status: Some(job.status),
                progress: Some(job.progress),
                items_processed: Some(summary.items_processed),
                total_cost: Some(summary.total_cost),
                success_files: Some(summary.success_files),
                file_failures: Some(summary.file_failures),
                cancelled_files: Some(summary.cancelled_files),
                read: None,
            },
        );
    }

    fn notify_complete(&self, job: &Job) {
        if let Some(callback) = &self.inner.on_job_complete {
            callback(job);
        }
    }

    /// Read-modify-write of one job under the write lock.
    fn update_job<R>(&self, job_id: &str, f: impl FnOnce(&mut Job) -> R) -> Option<R> {
        let mut jobs = self.write_jobs();
        jobs.get_mut(job_id).map(f)
    }

    fn take_token(&self, job_id: &str) -> Option<CancellationToken> {
        self.lock_tokens().remove(job_id)
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.inner.jobs.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.inner.jobs.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job table lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn lock_tokens(&self) -> MutexGuard<'_, HashMap<String, CancellationToken>> {
        match self.inner.tokens.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Token registry lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    #[cfg(test)]
    fn has_token(&self, job_id: &str) -> bool {
        self.lock_tokens().contains_key(job_id)
    }
}

fn title_for(status: JobStatus, total: usize) -> String {
    match status {
        JobStatus::Queued | JobStatus::Processing => format!("Processing {} file(s)", total),
        JobStatus::Completed => "Extraction complete".to_string(),
        JobStatus::Failed => "Extraction failed".to_string(),
        JobStatus::Cancelled => "Extraction cancelled".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{ExtractionError, ExtractionUsage};
    use crate::history::HistoryItem;
    use crate::notifications::NotificationFeed;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::{mpsc, Notify};

    /// Succeeds for every file except names containing "fail"; optionally
    /// holds every call until released.
    struct ScriptedClient {
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl ExtractionClient for ScriptedClient {
        async fn extract(
            &self,
            file: &InputFile,
            _cancel: &CancellationToken,
        ) -> Result<Extraction, ExtractionError> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if file.name.contains("fail") {
                return Err(ExtractionError::Other("network error".to_string()));
            }
            Ok(Extraction {
                data: serde_json::json!({"text": "```json\n{\"file\":1}\n```"}),
                usage: ExtractionUsage {
                    estimated_cost: 0.01,
                    ..Default::default()
                },
            })
        }
    }

    #[derive(Default)]
    struct CountingHistory {
        items: AtomicUsize,
        blobs: AtomicUsize,
    }

    #[async_trait]
    impl HistoryStore for CountingHistory {
        async fn save_history_item(
            &self,
            item: NewHistoryItem,
        ) -> Result<HistoryItem, HistoryError> {
            let n = self.items.fetch_add(1, Ordering::SeqCst);
            Ok(HistoryItem {
                id: format!("h{}", n),
                job_id: item.job_id,
                file_name: item.file_name,
                mime_type: item.mime_type,
                text: item.text,
                parsed: item.parsed,
                usage: item.usage,
                thumbnail: item.thumbnail,
                blob_path: None,
                created_at: Utc::now(),
            })
        }

        async fn save_file_blob(&self, _id: &str, _file: &InputFile) -> Result<(), HistoryError> {
            self.blobs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Fixture {
        manager: JobManager,
        feed: NotificationFeed,
        history: Arc<CountingHistory>,
        completed: mpsc::UnboundedReceiver<Job>,
    }

    fn fixture(gate: Option<Arc<Notify>>) -> Fixture {
        let feed = NotificationFeed::default();
        let history = Arc::new(CountingHistory::default());
        let (tx, completed) = mpsc::unbounded_channel();
        let manager = JobManager::builder(
            Arc::new(ScriptedClient { gate }),
            Arc::new(feed.clone()),
            history.clone(),
        )
        .on_job_complete(move |job| {
            let _ = tx.send(job.clone());
        })
        .build();
        Fixture {
            manager,
            feed,
            history,
            completed,
        }
    }

    fn files(names: &[&str]) -> Vec<InputFile> {
        names
            .iter()
            .map(|n| InputFile::new(*n, b"%PDF".to_vec()))
            .collect()
    }

    #[tokio::test]
    async fn test_zero_file_job_completes_synchronously() {
        let mut fx = fixture(None);
        let id = fx.manager.start_batch_job(Vec::new());

        let done = fx.completed.try_recv().unwrap();
        assert_eq!(done.id, id);
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, JobProgress::new(0, 0));
        assert!(done.end_time.is_some());
        assert_eq!(fx.manager.active_job_count(), 0);

        let notification = fx.feed.get(&done.notification_id).unwrap();
        assert_eq!(notification.status, JobStatus::Completed);
        assert_eq!(notification.title, "Extraction complete");
    }

    #[tokio::test]
    async fn test_job_completes_and_persists_successes() {
        let mut fx = fixture(None);
        let id = fx.manager.start_batch_job(files(&["a.pdf", "fail.pdf", "c.pdf"]));

        let done = fx.completed.recv().await.unwrap();
        assert_eq!(done.id, id);
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.progress, JobProgress::new(3, 3));
        assert_eq!(fx.history.items.load(Ordering::SeqCst), 2);
        assert_eq!(fx.history.blobs.load(Ordering::SeqCst), 2);
        assert!(!fx.manager.has_token(&id));

        let notification = fx.feed.get(&done.notification_id).unwrap();
        assert_eq!(notification.description, "2 of 3 succeeded");
        assert_eq!(notification.file_failures.len(), 1);
        assert_eq!(notification.file_failures[0].name, "fail.pdf");
        assert!((notification.total_cost - 0.02).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_all_failed_job_is_failed() {
        let mut fx = fixture(None);
        fx.manager.start_batch_job(files(&["fail-1.pdf", "fail-2.pdf"]));

        let done = fx.completed.recv().await.unwrap();
        assert_eq!(done.status, JobStatus::Failed);
        assert_eq!(fx.history.items.load(Ordering::SeqCst), 0);
        let notification = fx.feed.get(&done.notification_id).unwrap();
        assert_eq!(notification.title, "Extraction failed");
    }

    #[tokio::test]
    async fn test_cancel_is_immediate_sticky_and_idempotent() {
        let gate = Arc::new(Notify::new());
        let mut fx = fixture(Some(gate.clone()));
        let id = fx.manager.start_batch_job(files(&["a.pdf", "b.pdf"]));
        assert_eq!(fx.manager.active_job_count(), 1);

        assert!(fx.manager.cancel_job(&id));
        let job = fx.manager.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        let end_time = job.end_time;
        assert!(end_time.is_some());
        assert!(!fx.manager.has_token(&id));

        assert!(!fx.manager.cancel_job(&id));
        assert_eq!(fx.manager.get_job(&id).unwrap().end_time, end_time);

        // Late progress after cancellation must not revive the job.
        fx.manager.handle_progress(
            &id,
            2,
            2,
            &[
                Some(BatchFileResult::failed(&InputFile::new("a.pdf", vec![]), "x")),
                None,
            ],
        );
        let job = fx.manager.get_job(&id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.results[0].is_some());

        gate.notify_waiters();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fx.manager.get_job(&id).unwrap().status, JobStatus::Cancelled);
        assert!(fx.completed.try_recv().is_err());
        assert_eq!(fx.history.items.load(Ordering::SeqCst), 0);

        let notification = fx.feed.get(&job.notification_id).unwrap();
        assert_eq!(notification.status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let fx = fixture(None);
        assert!(!fx.manager.cancel_job("nope"));
        assert!(fx.manager.get_job("nope").is_none());
    }

    #[tokio::test]
    async fn test_fail_job_records_message() {
        let gate = Arc::new(Notify::new());
        let mut fx = fixture(Some(gate));
        let id = fx.manager.start_batch_job(files(&["a.pdf"]));

        fx.manager.fail_job(&id, "Batch aborted: boom".to_string());
        let job = fx.completed.recv().await.unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Batch aborted: boom"));

        let notification = fx.feed.get(&job.notification_id).unwrap();
        assert_eq!(notification.description, "Batch aborted: boom");
        assert!(!fx.manager.cancel_job(&id));
    }

    #[tokio::test]
    async fn test_jobs_are_listed_oldest_first() {
        let fx = fixture(None);
        let first = fx.manager.start_batch_job(Vec::new());
        tokio::time::sleep(Duration::from_millis(2)).await;
        let second = fx.manager.start_batch_job(Vec::new());

        let ids: Vec<String> = fx.manager.jobs().into_iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![first, second]);
    }
}
