//! Fabrica Client Implementation

use std::time::Duration;

use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};

use crate::error::{Result, SdkError};
use crate::types::{
    CancelResponse, CreateJobRequest, CreateJobResponse, StatsResponse, StatusResponse,
};

/// Fabrica Generation Engine client
///
/// # Example
///
/// ```no_run
/// use fabrica_sdk::FabricaClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = FabricaClient::connect("http://127.0.0.1:9630").await?;
/// # Ok(())
/// # }
/// ```
pub struct FabricaClient {
    client: HttpClient,
}

impl FabricaClient {
    /// Connect to the Fabrica daemon.
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9630`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url.as_ref())
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Create a job. Returns immediately with the id to poll.
    pub async fn create_job(&self, request: CreateJobRequest) -> Result<CreateJobResponse> {
        let mut params = ObjectParams::new();
        params.insert("job_type", request.job_type)?;
        params.insert("params", request.params)?;
        params.insert("options", request.options)?;
        let response: CreateJobResponse = self.client.request("gen.create_job.v1", params).await?;
        Ok(response)
    }

    /// Poll a job's status once.
    pub async fn status(&self, job_id: impl Into<String>) -> Result<StatusResponse> {
        let mut params = ObjectParams::new();
        params.insert("job_id", job_id.into())?;
        let response: StatusResponse = self.client.request("gen.status.v1", params).await?;
        Ok(response)
    }

    /// Cancel a still-pending job. `cancelled` is false once the job has
    /// started processing.
    pub async fn cancel(&self, job_id: impl Into<String>) -> Result<CancelResponse> {
        let mut params = ObjectParams::new();
        params.insert("job_id", job_id.into())?;
        let response: CancelResponse = self.client.request("gen.cancel.v1", params).await?;
        Ok(response)
    }

    /// Engine statistics.
    pub async fn stats(&self) -> Result<StatsResponse> {
        let response: StatsResponse = self
            .client
            .request("admin.stats.v1", ObjectParams::new())
            .await?;
        Ok(response)
    }

    /// Poll until the job reaches a terminal status, sleeping for the
    /// server-recommended delay between polls.
    pub async fn wait_for_terminal(
        &self,
        job_id: &str,
        timeout_ms: i64,
    ) -> Result<StatusResponse> {
        let started = std::time::Instant::now();
        loop {
            let status = self.status(job_id).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            if started.elapsed().as_millis() as i64 >= timeout_ms {
                return Err(SdkError::WaitTimeout(timeout_ms));
            }
            let delay = status.recommended_next_poll_ms.clamp(100, 10_000) as u64;
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::types::StatusResponse;

    #[test]
    fn terminal_detection() {
        let make = |status: &str| StatusResponse {
            job_id: "j".into(),
            status: status.into(),
            progress: Default::default(),
            result: None,
            repaired: false,
            error: None,
            running_time_ms: 0,
            estimated_duration_ms: 0,
            estimated_remaining_ms: None,
            is_delayed: false,
            recommended_next_poll_ms: 1_000,
        };
        assert!(make("completed").is_terminal());
        assert!(make("failed").is_terminal());
        assert!(!make("pending").is_terminal());
        assert!(!make("processing").is_terminal());
        assert!(!make("delayed").is_terminal());
    }
}
