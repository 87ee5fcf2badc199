//! Job state: one batch submission and its per-file outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::batch::{BatchFileResult, FileStatus};
use crate::document::InputFile;
use crate::notifications::FileIssue;

/// Lifecycle status of a job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true for `Queued` and `Processing`.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Processing => write!(f, "Processing"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
            JobStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// Files completed so far out of the batch total.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobProgress {
    pub current: usize,
    pub total: usize,
}

impl JobProgress {
    pub fn new(current: usize, total: usize) -> Self {
        Self { current, total }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.total
    }
}

/// One batch submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub files: Vec<InputFile>,
    pub status: JobStatus,
    pub progress: JobProgress,
    /// One slot per input file; `None` until that file's outcome is known.
    pub results: Vec<Option<BatchFileResult>>,
    pub notification_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Set when the batch orchestration itself failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Job {
    pub(crate) fn new(id: String, files: Vec<InputFile>, notification_id: String) -> Self {
        let total = files.len();
        Self {
            id,
            results: vec![None; total],
            files,
            status: JobStatus::Processing,
            progress: JobProgress::new(0, total),
            notification_id,
            start_time: Utc::now(),
            end_time: None,
            error: None,
        }
    }

    /// Moves the job into a terminal status, stamping `end_time` only on
    /// the first such transition.
    pub(crate) fn finish(&mut self, status: JobStatus) {
        if self.end_time.is_none() {
            self.end_time = Some(Utc::now());
        }
        self.status = status;
    }

    /// Folds a progress snapshot into the job. Recorded slots are never
    /// overwritten and `progress.current` never decreases.
    pub(crate) fn record_progress(
        &mut self,
        current: usize,
        total: usize,
        snapshot: &[Option<BatchFileResult>],
    ) {
        for (slot, incoming) in self.results.iter_mut().zip(snapshot) {
            if slot.is_none() {
                if let Some(result) = incoming {
                    *slot = Some(result.clone());
                }
            }
        }
        self.progress = JobProgress::new(current.max(self.progress.current), total);
    }

    /// Status the job settles on once every file has an outcome: `Failed`
    /// iff all completed files failed or were cancelled.
    pub fn settled_status(&self) -> JobStatus {
        let mut completed = self.results.iter().flatten().peekable();
        if completed.peek().is_none() {
            return JobStatus::Completed;
        }
        if completed.all(|r| matches!(r.status, FileStatus::Failed | FileStatus::Cancelled)) {
            JobStatus::Failed
        } else {
            JobStatus::Completed
        }
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_results(&self.results)
    }
}

/// Aggregate view of a job's recorded outcomes, as shown on its notification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub items_processed: usize,
    pub total_cost: f64,
    pub success_files: Vec<String>,
    pub file_failures: Vec<FileIssue>,
    pub cancelled_files: Vec<FileIssue>,
}

impl BatchSummary {
    pub fn from_results(results: &[Option<BatchFileResult>]) -> Self {
        let mut summary = Self::default();
        for result in results.iter().flatten() {
            summary.items_processed += 1;
            let name = result.file.name.clone();
            let error = result.error.clone().unwrap_or_default();
            match result.status {
                FileStatus::Success => {
                    if let Some(extraction) = &result.result {
                        summary.total_cost += extraction.usage.estimated_cost;
                    }
                    summary.success_files.push(name);
                }
                FileStatus::Failed => summary.file_failures.push(FileIssue { name, error }),
                FileStatus::Cancelled => summary.cancelled_files.push(FileIssue { name, error }),
            }
        }
        summary
    }

    pub fn succeeded(&self) -> usize {
        self.success_files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::{Extraction, ExtractionUsage};

    fn file(name: &str) -> InputFile {
        InputFile::new(name, vec![])
    }

    fn success(name: &str, cost: f64) -> BatchFileResult {
        BatchFileResult::success(
            &file(name),
            Extraction {
                data: serde_json::json!({}),
                usage: ExtractionUsage {
                    estimated_cost: cost,
                    ..Default::default()
                },
            },
        )
    }

    fn job(names: &[&str]) -> Job {
        Job::new(
            "job-1".to_string(),
            names.iter().map(|n| file(n)).collect(),
            "n-1".to_string(),
        )
    }

    #[test]
    fn test_new_job_has_one_empty_slot_per_file() {
        let job = job(&["a.pdf", "b.pdf"]);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress, JobProgress::new(0, 2));
        assert_eq!(job.results.len(), 2);
        assert!(job.results.iter().all(|r| r.is_none()));
        assert!(job.end_time.is_none());
    }

    #[test]
    fn test_record_progress_never_overwrites_slots() {
        let mut job = job(&["a.pdf", "b.pdf"]);
        job.record_progress(1, 2, &[Some(success("a.pdf", 0.1)), None]);

        let replacement = BatchFileResult::failed(&file("a.pdf"), "late");
        job.record_progress(1, 2, &[Some(replacement), None]);

        let first = job.results[0].as_ref().unwrap();
        assert_eq!(first.status, FileStatus::Success);
        assert!(job.results[1].is_none());
    }

    #[test]
    fn test_progress_is_monotonic() {
        let mut job = job(&["a.pdf", "b.pdf"]);
        job.record_progress(2, 2, &[None, None]);
        job.record_progress(1, 2, &[None, None]);
        assert_eq!(job.progress.current, 2);
    }

    #[test]
    fn test_settled_status() {
        let mut job = job(&["a.pdf", "b.pdf", "c.pdf"]);
        job.record_progress(
            3,
            3,
            &[
                Some(BatchFileResult::failed(&file("a.pdf"), "x")),
                Some(BatchFileResult::cancelled(&file("b.pdf"), "y")),
                Some(success("c.pdf", 0.0)),
            ],
        );
        assert_eq!(job.settled_status(), JobStatus::Completed);

        let mut job = job_all_failed();
        assert_eq!(job.settled_status(), JobStatus::Failed);
        job.finish(JobStatus::Failed);
        assert!(job.end_time.is_some());
    }

    fn job_all_failed() -> Job {
        let mut job = job(&["a.pdf", "b.pdf"]);
        job.record_progress(
            2,
            2,
            &[
                Some(BatchFileResult::failed(&file("a.pdf"), "x")),
                Some(BatchFileResult::cancelled(&file("b.pdf"), "y")),
            ],
        );
        job
    }

    #[test]
    fn test_finish_stamps_end_time_once() {
        let mut job = job(&["a.pdf"]);
        job.finish(JobStatus::Cancelled);
        let first = job.end_time;
        job.finish(JobStatus::Cancelled);
        assert_eq!(job.end_time, first);
    }

    #[test]
    fn test_summary_partitions_outcomes() {
        let results = vec![
            Some(success("a.pdf", 0.25)),
            Some(BatchFileResult::failed(&file("b.pdf"), "network down")),
            None,
            Some(BatchFileResult::cancelled(&file("d.pdf"), "cancelled")),
            Some(success("e.pdf", 0.5)),
        ];
        let summary = BatchSummary::from_results(&results);

        assert_eq!(summary.items_processed, 4);
        assert_eq!(summary.success_files, vec!["a.pdf", "e.pdf"]);
        assert_eq!(
            summary.file_failures,
            vec![FileIssue {
                name: "b.pdf".to_string(),
                error: "network down".to_string()
            }]
        );
        assert_eq!(summary.cancelled_files.len(), 1);
        assert!((summary.total_cost - 0.75).abs() < 1e-9);
        assert_eq!(summary.succeeded(), 2);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(JobStatus::Processing.is_active());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
