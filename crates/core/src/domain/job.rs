// Job Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Job ID (UUID v4)
pub type JobId = String;

/// Persisted job status.
///
/// `Delayed` is deliberately absent: it is a read-time view over
/// `Processing`, see [`ReportedStatus`] and [`Job::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Status as reported to callers. A `Processing` job past its soft-timeout
/// threshold reports `Delayed` without the underlying execution being
/// altered or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportedStatus {
    Pending,
    Processing,
    Delayed,
    Completed,
    Failed,
}

impl std::fmt::Display for ReportedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReportedStatus::Pending => write!(f, "pending"),
            ReportedStatus::Processing => write!(f, "processing"),
            ReportedStatus::Delayed => write!(f, "delayed"),
            ReportedStatus::Completed => write!(f, "completed"),
            ReportedStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Closed set of handler kinds.
///
/// Each type maps to a target schema, an estimated duration, and a handler
/// registered ahead of time in the handler registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Outline,
    Flashcards,
    LessonPlan,
}

impl JobType {
    pub const ALL: [JobType; 3] = [JobType::Outline, JobType::Flashcards, JobType::LessonPlan];

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "outline" => Ok(JobType::Outline),
            "flashcards" => Ok(JobType::Flashcards),
            "lesson_plan" => Ok(JobType::LessonPlan),
            other => Err(DomainError::UnknownJobType(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Outline => "outline",
            JobType::Flashcards => "flashcards",
            JobType::LessonPlan => "lesson_plan",
        }
    }

    /// Wall-clock estimate shown to callers and used for the soft timeout.
    pub fn estimated_duration_ms(&self) -> i64 {
        match self {
            JobType::Outline => 8_000,
            JobType::Flashcards => 12_000,
            // Two chained upstream calls
            JobType::LessonPlan => 20_000,
        }
    }

    /// Schema backing the handler's primary pipeline call.
    pub fn schema_name(&self) -> &'static str {
        match self {
            JobType::Outline => "outline",
            JobType::Flashcards => "flashcards",
            JobType::LessonPlan => "lesson_plan",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-visible progress. Mutated only by the owning handler.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub stage: String,
    pub message: String,
    pub percent: u8,
}

/// Structured error surfaced on a terminal `Failed` job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub message: String,
    pub kind: String,
    pub timestamp: i64,
}

/// Per-job knobs accepted at creation time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobOptions {
    /// Override the default number of Failed -> Pending requeues.
    pub max_retries: Option<i32>,
    /// Identity used for admission control. Anonymous if absent.
    pub user_id: Option<String>,
}

/// Job Entity
///
/// Mutated only by the scheduler/worker layer and the handler it delegates
/// to; all timestamps are injected epoch-ms values, never system time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub job_type: JobType,
    /// Opaque to the core; each handler validates its own minimal shape.
    pub params: serde_json::Value,
    pub status: JobStatus,
    pub progress: JobProgress,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,

    pub result: Option<serde_json::Value>,
    /// The result came out of the repair pass rather than clean validation.
    pub repaired: bool,
    pub error: Option<JobError>,

    pub retry_count: i32,
    pub max_retries: i32,

    pub estimated_duration_ms: i64,
    pub user_id: Option<String>,
}

/// Soft-timeout slack added on top of the estimate for short jobs.
const SOFT_TIMEOUT_SLACK_MS: i64 = 10_000;

impl Job {
    /// Create a new Pending job.
    ///
    /// # Arguments
    ///
    /// * `id` - Unique job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected)
    /// * `job_type` - Handler kind
    /// * `params` - Handler parameters, opaque at this layer
    /// * `max_retries` - Requeue budget for the whole job
    pub fn new(
        id: impl Into<String>,
        created_at: i64,
        job_type: JobType,
        params: serde_json::Value,
        max_retries: i32,
    ) -> Self {
        Self {
            id: id.into(),
            job_type,
            params,
            status: JobStatus::Pending,
            progress: JobProgress::default(),
            created_at,
            started_at: None,
            completed_at: None,
            result: None,
            repaired: false,
            error: None,
            retry_count: 0,
            max_retries,
            estimated_duration_ms: job_type.estimated_duration_ms(),
            user_id: None,
        }
    }

    /// Transition to Processing with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        if self.status != JobStatus::Pending {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "processing".to_string(),
            });
        }
        self.status = JobStatus::Processing;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Transition to Completed with the handler's final output
    pub fn complete(
        &mut self,
        now_millis: i64,
        result: serde_json::Value,
        repaired: bool,
    ) -> Result<()> {
        if self.status != JobStatus::Processing {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "completed".to_string(),
            });
        }
        self.status = JobStatus::Completed;
        self.completed_at = Some(now_millis);
        self.result = Some(result);
        self.repaired = repaired;
        Ok(())
    }

    /// Transition to Failed with a structured error.
    ///
    /// Allowed from Pending (cancellation) and Processing (handler failure).
    pub fn fail(&mut self, now_millis: i64, error: JobError) -> Result<()> {
        match self.status {
            JobStatus::Pending | JobStatus::Processing => {
                self.status = JobStatus::Failed;
                self.completed_at = Some(now_millis);
                self.error = Some(error);
                Ok(())
            }
            _ => Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "failed".to_string(),
            }),
        }
    }

    /// Take the single Failed -> Pending retry edge.
    ///
    /// Guarded by the `retry_count <= max_retries` invariant; refuses once
    /// the budget is spent.
    pub fn requeue(&mut self) -> Result<()> {
        if self.status != JobStatus::Failed {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: "pending".to_string(),
            });
        }
        if self.retry_count >= self.max_retries {
            return Err(DomainError::RetriesExhausted {
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        self.retry_count += 1;
        self.status = JobStatus::Pending;
        self.started_at = None;
        self.completed_at = None;
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    /// Advisory threshold after which a Processing job reports Delayed.
    pub fn soft_timeout_ms(&self) -> i64 {
        (self.estimated_duration_ms * 2).max(self.estimated_duration_ms + SOFT_TIMEOUT_SLACK_MS)
    }

    /// Compute the caller-facing view at `now_millis`.
    ///
    /// The Delayed view and the recommended poll delay are both derived
    /// lazily from stored timestamps; no timers are involved.
    pub fn snapshot(&self, now_millis: i64) -> JobSnapshot {
        let running_time_ms = match (self.status, self.started_at) {
            (JobStatus::Pending, _) => 0,
            (_, Some(started)) => {
                let end = self.completed_at.unwrap_or(now_millis);
                (end - started).max(0)
            }
            (_, None) => 0,
        };

        let is_delayed =
            self.status == JobStatus::Processing && running_time_ms > self.soft_timeout_ms();

        let status = match self.status {
            JobStatus::Pending => ReportedStatus::Pending,
            JobStatus::Processing if is_delayed => ReportedStatus::Delayed,
            JobStatus::Processing => ReportedStatus::Processing,
            JobStatus::Completed => ReportedStatus::Completed,
            JobStatus::Failed => ReportedStatus::Failed,
        };

        let estimated_remaining_ms = if self.status == JobStatus::Processing {
            Some((self.estimated_duration_ms - running_time_ms).max(0))
        } else {
            None
        };

        JobSnapshot {
            job_id: self.id.clone(),
            job_type: self.job_type,
            status,
            progress: self.progress.clone(),
            result: self.result.clone(),
            repaired: self.repaired,
            error: self.error.clone(),
            running_time_ms,
            estimated_duration_ms: self.estimated_duration_ms,
            estimated_remaining_ms,
            is_delayed,
            recommended_next_poll_ms: recommended_poll_delay(self.status, running_time_ms),
        }
    }
}

/// Point-in-time view returned by status reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub job_type: JobType,
    pub status: ReportedStatus,
    pub progress: JobProgress,
    pub result: Option<serde_json::Value>,
    pub repaired: bool,
    pub error: Option<JobError>,
    pub running_time_ms: i64,
    pub estimated_duration_ms: i64,
    pub estimated_remaining_ms: Option<i64>,
    pub is_delayed: bool,
    pub recommended_next_poll_ms: i64,
}

/// Poll-delay ladder: tight while the job is young, backing off to 5s
/// after a minute of running time. Terminal jobs need no further polls.
fn recommended_poll_delay(status: JobStatus, running_time_ms: i64) -> i64 {
    match status {
        JobStatus::Completed | JobStatus::Failed => 0,
        JobStatus::Pending => 1_000,
        JobStatus::Processing => match running_time_ms {
            t if t < 10_000 => 1_000,
            t if t < 30_000 => 2_000,
            t if t < 60_000 => 3_000,
            _ => 5_000,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_job() -> Job {
        Job::new("job-1", 1_000, JobType::Outline, json!({"title": "Learn X"}), 2)
    }

    #[test]
    fn lifecycle_transitions() {
        let mut job = test_job();
        assert_eq!(job.status, JobStatus::Pending);

        job.start(2_000).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.started_at, Some(2_000));

        job.complete(5_000, json!({"title": "Learn X"}), false).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.completed_at, Some(5_000));
        assert!(job.is_terminal());
    }

    #[test]
    fn start_requires_pending() {
        let mut job = test_job();
        job.start(2_000).unwrap();
        let err = job.start(3_000).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn complete_requires_processing() {
        let mut job = test_job();
        assert!(job.complete(2_000, json!({}), false).is_err());
    }

    #[test]
    fn requeue_respects_retry_budget() {
        let mut job = test_job();
        for attempt in 1..=2 {
            job.start(1_000).unwrap();
            job.fail(
                2_000,
                JobError {
                    message: "boom".into(),
                    kind: "transient_network".into(),
                    timestamp: 2_000,
                },
            )
            .unwrap();
            job.requeue().unwrap();
            assert_eq!(job.retry_count, attempt);
            assert_eq!(job.status, JobStatus::Pending);
        }

        job.start(1_000).unwrap();
        job.fail(
            2_000,
            JobError {
                message: "boom".into(),
                kind: "transient_network".into(),
                timestamp: 2_000,
            },
        )
        .unwrap();
        let err = job.requeue().unwrap_err();
        assert!(matches!(err, DomainError::RetriesExhausted { .. }));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn cancel_from_pending_is_a_failure_transition() {
        let mut job = test_job();
        job.fail(
            1_500,
            JobError {
                message: "cancelled by caller".into(),
                kind: "cancelled".into(),
                timestamp: 1_500,
            },
        )
        .unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_ref().unwrap().kind, "cancelled");
    }

    #[test]
    fn snapshot_reports_delayed_past_soft_timeout() {
        let mut job = test_job();
        job.start(10_000).unwrap();

        // Outline estimate is 8s; soft timeout is max(16s, 18s) = 18s
        let snap = job.snapshot(10_000 + 17_000);
        assert!(!snap.is_delayed);
        assert_eq!(snap.status, ReportedStatus::Processing);

        let snap = job.snapshot(10_000 + 19_000);
        assert!(snap.is_delayed);
        assert_eq!(snap.status, ReportedStatus::Delayed);
        // Underlying status untouched
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn snapshot_poll_delay_grows_with_running_time() {
        let mut job = test_job();
        job.start(0).unwrap();

        assert_eq!(job.snapshot(5_000).recommended_next_poll_ms, 1_000);
        assert_eq!(job.snapshot(15_000).recommended_next_poll_ms, 2_000);
        assert_eq!(job.snapshot(45_000).recommended_next_poll_ms, 3_000);
        assert_eq!(job.snapshot(90_000).recommended_next_poll_ms, 5_000);
    }

    #[test]
    fn snapshot_remaining_estimate_clamps_at_zero() {
        let mut job = test_job();
        job.start(0).unwrap();

        let snap = job.snapshot(3_000);
        assert_eq!(snap.estimated_remaining_ms, Some(5_000));

        let snap = job.snapshot(60_000);
        assert_eq!(snap.estimated_remaining_ms, Some(0));
    }

    #[test]
    fn job_type_parse_round_trip() {
        for job_type in JobType::ALL {
            assert_eq!(JobType::parse(job_type.as_str()).unwrap(), job_type);
        }
        assert!(matches!(
            JobType::parse("bogus"),
            Err(DomainError::UnknownJobType(_))
        ));
    }
}
