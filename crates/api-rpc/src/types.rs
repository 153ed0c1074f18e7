//! RPC Request/Response Types
//!
//! Defines the JSON-RPC method parameters and results. Response shapes are
//! the API contract; they mirror but do not expose core domain types.

use serde::{Deserialize, Serialize};

use fabrica_core::domain::{JobError, JobOptions, JobProgress, JobSnapshot};

/// gen.create_job.v1 - Create a job
#[derive(Debug, Deserialize)]
pub struct CreateJobParams {
    pub job_type: String,
    pub params: serde_json::Value,
    #[serde(default)]
    pub options: JobOptions,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub estimated_duration_ms: i64,
    /// RPC method to poll for progress.
    pub poll_method: String,
}

/// gen.status.v1 - Poll a job
#[derive(Debug, Deserialize)]
pub struct StatusParams {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: String,
    pub progress: JobProgress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub repaired: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
    pub running_time_ms: i64,
    pub estimated_duration_ms: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_remaining_ms: Option<i64>,
    pub is_delayed: bool,
    pub recommended_next_poll_ms: i64,
}

impl From<JobSnapshot> for StatusResponse {
    fn from(snapshot: JobSnapshot) -> Self {
        Self {
            job_id: snapshot.job_id,
            status: snapshot.status.to_string(),
            progress: snapshot.progress,
            result: snapshot.result,
            repaired: snapshot.repaired,
            error: snapshot.error,
            running_time_ms: snapshot.running_time_ms,
            estimated_duration_ms: snapshot.estimated_duration_ms,
            estimated_remaining_ms: snapshot.estimated_remaining_ms,
            is_delayed: snapshot.is_delayed,
            recommended_next_poll_ms: snapshot.recommended_next_poll_ms,
        }
    }
}

/// gen.cancel.v1 - Cancel a pending job
#[derive(Debug, Deserialize)]
pub struct CancelParams {
    pub job_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

/// admin.stats.v1 - Engine statistics
#[derive(Debug, Deserialize)]
pub struct StatsParams {
    // No parameters needed
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub uptime_seconds: i64,
}
