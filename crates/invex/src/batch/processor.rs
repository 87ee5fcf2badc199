//! Drives a batch of files through the rate limiter and extraction client.

use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use super::rate_limiter::RateLimiter;
use super::BatchError;
use crate::document::InputFile;
use crate::extraction::{Extraction, ExtractionClient, ExtractionError};

/// Default number of extraction calls in flight per batch.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// Message recorded when an error carries no text of its own.
const UNKNOWN_ERROR: &str = "Unknown error";

/// Message recorded for files skipped because the batch was cancelled.
const CANCELLED_BEFORE_START: &str = "Cancelled before processing started";

/// Terminal status of one file in a batch.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    Failed,
    Cancelled,
}

/// One file's outcome within a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFileResult {
    pub file: InputFile,
    pub status: FileStatus,
    /// Present iff `status` is `Success`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Extraction>,
    /// Present iff `status` is `Failed` or `Cancelled`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchFileResult {
    pub fn success(file: &InputFile, extraction: Extraction) -> Self {
        Self {
            file: file.clone(),
            status: FileStatus::Success,
            result: Some(extraction),
            error: None,
        }
    }

    pub fn failed(file: &InputFile, error: impl Into<String>) -> Self {
        Self {
            file: file.clone(),
            status: FileStatus::Failed,
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn cancelled(file: &InputFile, reason: impl Into<String>) -> Self {
        Self {
            file: file.clone(),
            status: FileStatus::Cancelled,
            result: None,
            error: Some(reason.into()),
        }
    }

    /// Classifies a caught error once: cancellations become `Cancelled`,
    /// everything else `Failed`.
    pub fn from_error(file: &InputFile, error: &ExtractionError) -> Self {
        let mut message = error.to_string();
        if message.trim().is_empty() {
            message = UNKNOWN_ERROR.to_string();
        }
        if error.is_cancellation() {
            Self::cancelled(file, message)
        } else {
            Self::failed(file, message)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == FileStatus::Success
    }
}

/// Settings for one [`process_batch`] call.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub max_concurrent: usize,
    pub cancel: CancellationToken,
    /// Per-file watchdog; `None` lets a hung call hold its slot indefinitely.
    pub file_timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            cancel: CancellationToken::new(),
            file_timeout: None,
        }
    }
}

/// Processes every file and resolves once all outcomes have settled.
///
/// `on_progress(completed, total, results)` is called exactly once per file,
/// in completion order, right after that file's slot in `results` is filled.
/// `results` is indexed by input position. Individual failures never stop
/// the batch.
pub async fn process_batch<F>(
    client: &dyn ExtractionClient,
    files: &[InputFile],
    options: BatchOptions,
    mut on_progress: F,
) -> Result<Vec<BatchFileResult>, BatchError>
where
    F: FnMut(usize, usize, &[Option<BatchFileResult>]),
{
    let total = files.len();
    let limiter = RateLimiter::new(options.max_concurrent);
    let cancel = &options.cancel;
    let file_timeout = options.file_timeout;
    let limiter_ref = &limiter;

    log::info!(
        "Processing batch of {} file(s) with up to {} concurrent request(s)",
        total,
        limiter.max_concurrent()
    );

    let mut pending = FuturesUnordered::new();
    for (index, file) in files.iter().enumerate() {
        pending.push(async move {
            let outcome = limiter_ref
                .add(|| process_file(client, file, cancel, file_timeout))
                .await;
            (index, outcome)
        });
    }

    let mut results: Vec<Option<BatchFileResult>> = vec![None; total];
    let mut completed = 0;

    while let Some((index, outcome)) = pending.next().await {
        if results[index].is_some() {
            return Err(BatchError::DuplicateOutcome { index });
        }
        results[index] = Some(outcome);
        completed += 1;
        on_progress(completed, total, &results);
    }

    results
        .into_iter()
        .enumerate()
        .map(|(index, slot)| slot.ok_or(BatchError::MissingOutcome { index }))
        .collect()
}

async fn process_file(
    client: &dyn ExtractionClient,
    file: &InputFile,
    cancel: &CancellationToken,
    file_timeout: Option<Duration>,
) -> BatchFileResult {
    if cancel.is_cancelled() {
        log::debug!("Skipping '{}': batch cancelled", file.name);
        return BatchFileResult::cancelled(file, CANCELLED_BEFORE_START);
    }

    let span = info_span!("batch.file", file = %file.name, size = file.size);
    let call = client.extract(file, cancel);
    let outcome = match file_timeout {
        Some(limit) => match tokio::time::timeout(limit, call).instrument(span).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ExtractionError::Timeout(limit)),
        },
        None => call.instrument(span).await,
    };

    match outcome {
        Ok(extraction) => BatchFileResult::success(file, extraction),
        Err(error) => {
            if error.is_cancellation() {
                log::info!("Extraction of '{}' cancelled: {}", file.name, error);
            } else {
                log::warn!("Extraction of '{}' failed: {}", file.name, error);
            }
            BatchFileResult::from_error(file, &error)
        }
    }
}
