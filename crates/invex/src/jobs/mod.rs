//! Batch job orchestration: job state, result normalization and the manager.

pub mod job;
pub mod manager;
pub mod normalize;

pub use job::{BatchSummary, Job, JobProgress, JobStatus};
pub use manager::{JobCompleteCallback, JobManager, JobManagerBuilder, JobManagerConfig};
pub use normalize::{normalize, strip_code_fence, NormalizedResult};
