// Application Layer - Use Cases and Services

pub mod catalog;
pub mod handler;
pub mod job_service;
pub mod pipeline;
pub mod retry;
pub mod schema_registry;
pub mod sweeper;
pub mod worker;

// Re-exports
pub use job_service::{CreateJobRequest, CreatedJob, EngineStats, JobService};
pub use pipeline::{InvocationPipeline, InvokeError, InvokeOptions, InvokeRequest, PipelineConfig};
pub use schema_registry::{OutputBudget, SchemaOptions, SchemaRegistry};
pub use sweeper::RetentionSweeper;
pub use worker::{shutdown_channel, spawn_worker_pool, ShutdownSender, ShutdownToken, Worker};
