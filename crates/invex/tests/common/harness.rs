//! Test harness for isolated job execution.
//!
//! Each harness owns a temp data directory with a real SQLite database,
//! a blob directory and a persistent notification feed.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;

use invex::jobs::Job;
use invex::{JobManager, JobManagerConfig, NotificationFeed, SqliteHistoryStore};

use super::builders::ScriptedClient;

const WAIT_LIMIT: Duration = Duration::from_secs(5);

pub struct TestHarness {
    temp_dir: TempDir,
    pub client: Arc<ScriptedClient>,
    pub history: SqliteHistoryStore,
    pub feed: NotificationFeed,
    pub manager: JobManager,
    completed: mpsc::UnboundedReceiver<Job>,
}

impl TestHarness {
    pub fn new(client: ScriptedClient) -> Self {
        Self::with_config(client, JobManagerConfig::default())
    }

    pub fn with_config(client: ScriptedClient, config: JobManagerConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let history =
            SqliteHistoryStore::open(temp_dir.path()).expect("Failed to open history store");
        let feed = NotificationFeed::with_database(history.database().clone(), 64);
        let client = Arc::new(client);

        let (tx, completed) = mpsc::unbounded_channel();
        let manager = JobManager::builder(
            client.clone(),
            Arc::new(feed.clone()),
            Arc::new(history.clone()),
        )
        .config(config)
        .on_job_complete(move |job: &Job| {
            let _ = tx.send(job.clone());
        })
        .build();

        Self {
            temp_dir,
            client,
            history,
            feed,
            manager,
            completed,
        }
    }

    pub fn data_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Waits for the next completion callback.
    pub async fn next_completed(&mut self) -> Job {
        tokio::time::timeout(WAIT_LIMIT, self.completed.recv())
            .await
            .expect("Timed out waiting for job completion")
            .expect("Completion channel closed")
    }

    /// Returns true if a completion callback has been delivered.
    pub fn has_completion(&mut self) -> bool {
        self.completed.try_recv().is_ok()
    }

    /// Polls the job until `predicate` holds.
    pub async fn wait_for_job<F>(&self, job_id: &str, predicate: F) -> Job
    where
        F: Fn(&Job) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            if let Some(job) = self.manager.get_job(job_id) {
                if predicate(&job) {
                    return job;
                }
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for job {}",
                job_id
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
