//! Bounded-concurrency batch processing of extraction calls.

pub mod processor;
pub mod rate_limiter;

use thiserror::Error;

pub use processor::{
    process_batch, BatchFileResult, BatchOptions, FileStatus, DEFAULT_MAX_CONCURRENT,
};
pub use rate_limiter::{normalize_max_concurrent, RateLimiter};

/// Failures of the batch orchestration itself, as opposed to individual
/// file failures (which are recorded in the results).
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("No outcome was recorded for file #{index}")]
    MissingOutcome { index: usize },

    #[error("Outcome for file #{index} was recorded twice")]
    DuplicateOutcome { index: usize },
}
