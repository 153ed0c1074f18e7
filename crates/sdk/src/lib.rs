//! Fabrica SDK - Rust Client Library
//!
//! Convenient client for the Fabrica Generation Engine daemon.
//!
//! # Example
//!
//! ```no_run
//! use fabrica_sdk::{CreateJobRequest, FabricaClient};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = FabricaClient::connect("http://127.0.0.1:9630").await?;
//!
//!     let created = client.create_job(CreateJobRequest {
//!         job_type: "outline".to_string(),
//!         params: json!({"title": "Learn Rust"}),
//!         options: Default::default(),
//!     }).await?;
//!
//!     let status = client.wait_for_terminal(&created.job_id, 120_000).await?;
//!     println!("{}: {}", created.job_id, status.status);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::FabricaClient;
pub use error::{Result, SdkError};
pub use types::{
    CancelResponse, CreateJobOptions, CreateJobRequest, CreateJobResponse, JobErrorInfo,
    ProgressInfo, StatsResponse, StatusResponse,
};
