// Job-level retry policy
//
// Independent of the pipeline's internal retry loop: this decides whether
// a whole failed job goes back into the pending queue. Requeueing releases
// the worker slot immediately; there is no in-slot backoff at this layer.

use tracing::{info, warn};

use crate::application::pipeline::InvokeError;
use crate::domain::Job;

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Put the job back at the tail of the pending queue.
    Requeue,
    /// Do not retry, the job has failed permanently.
    Fail,
}

pub struct RetryPolicy;

impl RetryPolicy {
    pub fn new() -> Self {
        Self
    }

    /// Decide the Failed -> Pending edge for `job` after `error`.
    ///
    /// Configuration faults are never requeued: re-running without
    /// credentials cannot succeed. Everything else is requeued while
    /// `retry_count < max_retries`.
    pub fn should_retry(&self, job: &Job, error: &InvokeError) -> RetryDecision {
        if matches!(error, InvokeError::Configuration(_) | InvokeError::Cancelled) {
            warn!(
                job_id = %job.id,
                kind = error.kind(),
                "fatal error kind, job will not be requeued"
            );
            return RetryDecision::Fail;
        }

        if job.retry_count >= job.max_retries {
            warn!(
                job_id = %job.id,
                retry_count = job.retry_count,
                max_retries = job.max_retries,
                "job retry budget exhausted"
            );
            return RetryDecision::Fail;
        }

        info!(
            job_id = %job.id,
            retry_count = job.retry_count,
            max_retries = job.max_retries,
            "scheduling job requeue"
        );
        RetryDecision::Requeue
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}
