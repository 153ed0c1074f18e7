// Job Service - Use cases for the job control surface
//
// create_job validates and enqueues without ever blocking on execution;
// status is a pure read computing the snapshot view; cancel only touches
// still-Pending jobs.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::application::handler::HandlerRegistry;
use crate::application::worker::constants::DEFAULT_JOB_MAX_RETRIES;
use crate::domain::{Job, JobError, JobId, JobOptions, JobSnapshot, JobStatus, JobType};
use crate::error::{AppError, Result};
use crate::port::{CostGovernor, IdProvider, JobStore, TimeProvider};

/// Create-job request as accepted from the API layer.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobRequest {
    pub job_type: String,
    pub params: Value,
    #[serde(default)]
    pub options: JobOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedJob {
    pub job_id: JobId,
    pub job_type: JobType,
    pub estimated_duration_ms: i64,
}

/// Counts by status plus totals, for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub total: i64,
    pub pending: i64,
    pub processing: i64,
    pub completed: i64,
    pub failed: i64,
}

pub struct JobService {
    store: Arc<dyn JobStore>,
    handlers: Arc<HandlerRegistry>,
    governor: Arc<dyn CostGovernor>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
    default_max_retries: i32,
}

impl JobService {
    pub fn new(
        store: Arc<dyn JobStore>,
        handlers: Arc<HandlerRegistry>,
        governor: Arc<dyn CostGovernor>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            handlers,
            governor,
            id_provider,
            time_provider,
            default_max_retries: DEFAULT_JOB_MAX_RETRIES,
        }
    }

    pub fn with_default_max_retries(mut self, max_retries: i32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Validate, admit, and enqueue. Returns immediately; execution is the
    /// worker pool's business.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<CreatedJob> {
        let job_type = JobType::parse(&request.job_type)?;
        self.handlers.validate_params(job_type, &request.params)?;

        let user = request
            .options
            .user_id
            .clone()
            .unwrap_or_else(|| "anonymous".to_string());
        let admission = self
            .governor
            .check_admission(&user, job_type.as_str())
            .await;
        if !admission.allowed {
            return Err(AppError::Throttled {
                retry_after_ms: admission.retry_after_ms.unwrap_or(1_000),
            });
        }

        let id = self.id_provider.generate_id();
        let now = self.time_provider.now_millis();
        let max_retries = request
            .options
            .max_retries
            .unwrap_or(self.default_max_retries)
            .max(0);

        let mut job = Job::new(id.clone(), now, job_type, request.params, max_retries);
        job.user_id = request.options.user_id;
        self.store.insert(&job).await?;

        info!(job_id = %id, job_type = %job_type, user = %user, "Job created");
        Ok(CreatedJob {
            job_id: id,
            job_type,
            estimated_duration_ms: job.estimated_duration_ms,
        })
    }

    /// Snapshot computed at read time (soft-timeout view, poll hints).
    pub async fn status(&self, job_id: &JobId) -> Result<JobSnapshot> {
        let job = self
            .store
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", job_id)))?;
        Ok(job.snapshot(self.time_provider.now_millis()))
    }

    /// Cancel a still-Pending job. Returns false for Processing or
    /// terminal jobs; cancellation never tears down in-flight work.
    pub async fn cancel(&self, job_id: &JobId) -> Result<bool> {
        if let Some(mut job) = self.store.take_pending(job_id).await? {
            let now = self.time_provider.now_millis();
            job.fail(
                now,
                JobError {
                    message: "cancelled by caller".to_string(),
                    kind: "cancelled".to_string(),
                    timestamp: now,
                },
            )?;
            self.store.update(&job).await?;
            info!(job_id = %job_id, "Job cancelled");
            return Ok(true);
        }

        // Not pending: distinguish unknown from uncancellable.
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} not found", job_id)))?;
        Ok(false)
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        let pending = self.store.count_by_status(JobStatus::Pending).await?;
        let processing = self.store.count_by_status(JobStatus::Processing).await?;
        let completed = self.store.count_by_status(JobStatus::Completed).await?;
        let failed = self.store.count_by_status(JobStatus::Failed).await?;
        Ok(EngineStats {
            total: pending + processing + completed + failed,
            pending,
            processing,
            completed,
            failed,
        })
    }
}
