//! SDK Types
//!
//! Wire-compatible with the daemon's JSON-RPC types but defined here so the
//! SDK compiles standalone.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateJobOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateJobRequest {
    pub job_type: String,
    pub params: serde_json::Value,
    pub options: CreateJobOptions,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateJobResponse {
    pub job_id: String,
    pub job_type: String,
    pub status: String,
    pub estimated_duration_ms: i64,
    pub poll_method: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProgressInfo {
    pub stage: String,
    pub message: String,
    pub percent: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobErrorInfo {
    pub message: String,
    pub kind: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub job_id: String,
    pub status: String,
    #[serde(default)]
    pub progress: ProgressInfo,
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub repaired: bool,
    pub error: Option<JobErrorInfo>,
    pub running_time_ms: i64,
    pub estimated_duration_ms: i64,
    pub estimated_remaining_ms: Option<i64>,
    pub is_delayed: bool,
    pub recommended_next_poll_ms: i64,
}

impl StatusResponse {
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "completed" | "failed")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelResponse {
    pub job_id: String,
    pub cancelled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatsResponse {
    pub total_jobs: i64,
    pub pending_jobs: i64,
    pub processing_jobs: i64,
    pub completed_jobs: i64,
    pub failed_jobs: i64,
    pub uptime_seconds: i64,
}
