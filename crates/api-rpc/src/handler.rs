//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method by delegating to
//! the core JobService.

use std::sync::Arc;

use jsonrpsee::types::ErrorObjectOwned;

use fabrica_core::application::{CreateJobRequest, JobService};

use crate::error::to_rpc_error;
use crate::types::{
    CancelParams, CancelResponse, CreateJobParams, CreateJobResponse, StatsParams, StatsResponse,
    StatusParams, StatusResponse,
};

pub const STATUS_METHOD: &str = "gen.status.v1";

/// RPC Handler with injected dependencies
pub struct RpcHandler {
    service: Arc<JobService>,
    start_time: std::time::Instant,
}

impl RpcHandler {
    pub fn new(service: Arc<JobService>) -> Self {
        Self {
            service,
            start_time: std::time::Instant::now(),
        }
    }

    /// gen.create_job.v1
    pub async fn create_job(
        &self,
        params: CreateJobParams,
    ) -> Result<CreateJobResponse, ErrorObjectOwned> {
        let created = self
            .service
            .create_job(CreateJobRequest {
                job_type: params.job_type,
                params: params.params,
                options: params.options,
            })
            .await
            .map_err(to_rpc_error)?;

        Ok(CreateJobResponse {
            job_id: created.job_id,
            job_type: created.job_type.to_string(),
            status: "pending".to_string(),
            estimated_duration_ms: created.estimated_duration_ms,
            poll_method: STATUS_METHOD.to_string(),
        })
    }

    /// gen.status.v1
    pub async fn status(&self, params: StatusParams) -> Result<StatusResponse, ErrorObjectOwned> {
        let snapshot = self
            .service
            .status(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(snapshot.into())
    }

    /// gen.cancel.v1
    pub async fn cancel(&self, params: CancelParams) -> Result<CancelResponse, ErrorObjectOwned> {
        let cancelled = self
            .service
            .cancel(&params.job_id)
            .await
            .map_err(to_rpc_error)?;
        Ok(CancelResponse {
            job_id: params.job_id,
            cancelled,
        })
    }

    /// admin.stats.v1
    pub async fn stats(&self, _params: StatsParams) -> Result<StatsResponse, ErrorObjectOwned> {
        let stats = self.service.stats().await.map_err(to_rpc_error)?;
        Ok(StatsResponse {
            total_jobs: stats.total,
            pending_jobs: stats.pending,
            processing_jobs: stats.processing,
            completed_jobs: stats.completed,
            failed_jobs: stats.failed,
            uptime_seconds: self.start_time.elapsed().as_secs() as i64,
        })
    }
}
