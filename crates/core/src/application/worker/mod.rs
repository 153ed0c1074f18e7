// Worker - Job execution loop
//
// A fixed pool of these workers IS the concurrency ceiling: each worker
// drives at most one Processing job, so a pool of N guarantees at most N
// jobs Processing at any instant. Dispatch order is FIFO; completion order
// is not guaranteed.

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use std::sync::Arc;

use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::application::handler::{HandlerContext, HandlerRegistry};
use crate::application::pipeline::{InvocationPipeline, InvokeError};
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{JobError, JobId};
use crate::error::{AppError, Result};
use crate::port::{JobStore, TimeProvider};

/// Worker processes jobs from the pending queue.
pub struct Worker {
    store: Arc<dyn JobStore>,
    handlers: Arc<HandlerRegistry>,
    pipeline: Arc<InvocationPipeline>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        handlers: Arc<HandlerRegistry>,
        pipeline: Arc<InvocationPipeline>,
        retry_policy: Arc<RetryPolicy>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            store,
            handlers,
            pipeline,
            retry_policy,
            time_provider,
        }
    }

    /// Run the worker loop with graceful shutdown support
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        info!("Worker started");
        loop {
            if shutdown.is_shutdown() {
                info!("Worker shutting down");
                break;
            }
            match self.process_next_job().await {
                Ok(processed) => {
                    if !processed {
                        // No job available, sleep briefly (or wait for shutdown)
                        tokio::select! {
                            _ = sleep(IDLE_SLEEP_DURATION) => {},
                            _ = shutdown.wait() => {
                                info!("Worker interrupted during idle");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!("Worker error: {}", e);
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("Worker stopped");
        Ok(())
    }

    /// Process the next pending job (returns true if a job was processed)
    pub async fn process_next_job(&self) -> Result<bool> {
        let now = self.time_provider.now_millis();

        // Pop next job (atomically marked Processing by the store)
        let Some(job) = self.store.pop_next_pending(now).await? else {
            return Ok(false);
        };
        let job_id = job.id.clone();

        info!(job_id = %job_id, job_type = %job.job_type, "Processing job");

        let Some(handler) = self.handlers.get(job.job_type) else {
            // Closed enum; reaching this means wiring is broken.
            self.finish_failed(
                &job_id,
                InvokeError::Configuration(format!("no handler bound for {}", job.job_type)),
            )
            .await?;
            return Ok(true);
        };

        // Execute with panic isolation: a panicking handler must not take
        // the worker loop down with it.
        let ctx = HandlerContext::new(&job, Arc::clone(&self.pipeline), Arc::clone(&self.store));
        let handle = tokio::task::spawn(async move { handler.run(&ctx).await });
        let execution_result = handle.await;

        match execution_result {
            Ok(Ok(output)) => {
                let now = self.time_provider.now_millis();
                // Re-read: the handler published progress through the store.
                let mut job = self.load(&job_id).await?;
                job.complete(now, output.result, output.repaired)?;
                self.store.update(&job).await?;
                info!(job_id = %job_id, repaired = job.repaired, "Job completed");
            }
            Ok(Err(invoke_error)) => {
                self.finish_failed(&job_id, invoke_error).await?;
            }
            Err(join_error) => {
                if join_error.is_panic() {
                    error!(job_id = %job_id, "Job handler panicked: {:?}", join_error);
                } else {
                    error!(job_id = %job_id, "Job handler cancelled: {:?}", join_error);
                }
                let now = self.time_provider.now_millis();
                let mut job = self.load(&job_id).await?;
                job.fail(
                    now,
                    JobError {
                        message: format!("handler panicked: {}", join_error),
                        kind: "panic".to_string(),
                        timestamp: now,
                    },
                )?;
                self.store.update(&job).await?;
            }
        }
        Ok(true)
    }

    /// Mark the job Failed, then consult the retry policy for the
    /// Failed -> Pending requeue edge.
    async fn finish_failed(&self, job_id: &JobId, error: InvokeError) -> Result<()> {
        let now = self.time_provider.now_millis();
        let mut job = self.load(job_id).await?;
        job.fail(
            now,
            JobError {
                message: error.to_string(),
                kind: error.kind().to_string(),
                timestamp: now,
            },
        )?;

        match self.retry_policy.should_retry(&job, &error) {
            RetryDecision::Requeue => {
                job.requeue()?;
                self.store.requeue(&job).await?;
                info!(
                    job_id = %job.id,
                    retry_count = job.retry_count,
                    "Job requeued after failure"
                );
            }
            RetryDecision::Fail => {
                self.store.update(&job).await?;
                warn!(job_id = %job.id, kind = %error.kind(), "Job failed terminally");
            }
        }
        Ok(())
    }

    async fn load(&self, job_id: &JobId) -> Result<crate::domain::Job> {
        self.store
            .get(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("job {} vanished mid-flight", job_id)))
    }
}

/// Spawn a pool of `count` workers sharing one shutdown token.
pub fn spawn_worker_pool(
    count: usize,
    store: Arc<dyn JobStore>,
    handlers: Arc<HandlerRegistry>,
    pipeline: Arc<InvocationPipeline>,
    retry_policy: Arc<RetryPolicy>,
    time_provider: Arc<dyn TimeProvider>,
    shutdown: ShutdownToken,
) -> Vec<tokio::task::JoinHandle<Result<()>>> {
    (0..count)
        .map(|_| {
            let worker = Worker::new(
                Arc::clone(&store),
                Arc::clone(&handlers),
                Arc::clone(&pipeline),
                Arc::clone(&retry_policy),
                Arc::clone(&time_provider),
            );
            let token = shutdown.clone();
            tokio::spawn(async move { worker.run(token).await })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::catalog::register_builtin_schemas;
    use crate::application::schema_registry::SchemaRegistry;
    use crate::domain::{Job, JobStatus, JobType};
    use crate::port::content_cache::mocks::NullCache;
    use crate::port::cost_governor::mocks::AllowAllGovernor;
    use crate::port::generative_client::mocks::{Reply, ScriptedClient};
    use crate::port::job_store::mocks::TestJobStore;
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::GenerateError;
    use serde_json::json;

    fn worker_with(client: Arc<ScriptedClient>, store: Arc<TestJobStore>) -> Worker {
        let registry = Arc::new(SchemaRegistry::new());
        register_builtin_schemas(&registry).unwrap();
        let pipeline = Arc::new(InvocationPipeline::new(
            registry,
            client,
            Arc::new(NullCache),
            Arc::new(AllowAllGovernor),
            crate::application::pipeline::PipelineConfig {
                base_delay_ms: 1,
                ..Default::default()
            },
        ));
        Worker::new(
            store,
            Arc::new(HandlerRegistry::with_builtin()),
            pipeline,
            Arc::new(RetryPolicy::new()),
            Arc::new(SystemTimeProvider),
        )
    }

    fn valid_outline() -> String {
        json!({
            "title": "Learn Rust",
            "overview": "A practical path.",
            "sections": [{"heading": "Ownership"}]
        })
        .to_string()
    }

    async fn enqueue_outline(store: &TestJobStore, id: &str) {
        let job = Job::new(id, 1_000, JobType::Outline, json!({"title": "Learn X"}), 1);
        store.insert(&job).await.unwrap();
    }

    #[tokio::test]
    async fn successful_job_reaches_completed_with_result() {
        let store = Arc::new(TestJobStore::new());
        let worker = worker_with(Arc::new(ScriptedClient::always(valid_outline())), store.clone());

        enqueue_outline(&store, "job-1").await;
        assert!(worker.process_next_job().await.unwrap());

        let job = store.get(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.result.is_some());
        assert!(!job.repaired);
    }

    #[tokio::test]
    async fn empty_queue_reports_no_work() {
        let store = Arc::new(TestJobStore::new());
        let worker = worker_with(Arc::new(ScriptedClient::always(valid_outline())), store);
        assert!(!worker.process_next_job().await.unwrap());
    }

    #[tokio::test]
    async fn pipeline_failure_requeues_then_fails_terminally() {
        let store = Arc::new(TestJobStore::new());
        let client = Arc::new(ScriptedClient::always_fail(GenerateError::TransientNetwork(
            "refused".into(),
        )));
        let worker = worker_with(client, store.clone());

        enqueue_outline(&store, "job-1").await; // max_retries = 1

        // First pass: fails, requeued.
        assert!(worker.process_next_job().await.unwrap());
        let job = store.get(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.retry_count, 1);

        // Second pass: budget spent, terminal failure.
        assert!(worker.process_next_job().await.unwrap());
        let job = store.get(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_ref().unwrap().kind, "transient_network");
    }

    #[tokio::test]
    async fn configuration_failure_is_terminal_immediately() {
        let store = Arc::new(TestJobStore::new());
        let client = Arc::new(ScriptedClient::always_fail(GenerateError::Configuration(
            "missing api key".into(),
        )));
        let worker = worker_with(client, store.clone());

        enqueue_outline(&store, "job-1").await;
        assert!(worker.process_next_job().await.unwrap());

        let job = store.get(&"job-1".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.error.as_ref().unwrap().kind, "configuration");
    }

    #[tokio::test]
    async fn handler_progress_survives_into_completion() {
        let store = Arc::new(TestJobStore::new());
        let client = Arc::new(ScriptedClient::new(vec![
            Reply::Text(json!({"questions": ["Audience?"], "assumptions": ["Beginners"]}).to_string()),
            Reply::Text(
                json!({
                    "title": "Rust 101",
                    "objective": "Teach ownership",
                    "duration_minutes": 45,
                    "steps": [{"name": "Intro", "detail": "Why Rust"}]
                })
                .to_string(),
            ),
        ]));
        let worker = worker_with(client, store.clone());

        let job = Job::new(
            "job-chain",
            1_000,
            JobType::LessonPlan,
            json!({"title": "Rust 101"}),
            0,
        );
        store.insert(&job).await.unwrap();
        assert!(worker.process_next_job().await.unwrap());

        let job = store.get(&"job-chain".to_string()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        let result = job.result.unwrap();
        assert_eq!(result["plan"]["title"], json!("Rust 101"));
        assert_eq!(result["clarifications"]["questions"][0], json!("Audience?"));
        // Last progress stage the handler published is retained.
        assert_eq!(job.progress.stage, "finalize");
    }

    #[tokio::test]
    async fn worker_shutdown_is_graceful() {
        let store = Arc::new(TestJobStore::new());
        let worker = worker_with(Arc::new(ScriptedClient::always(valid_outline())), store);

        let (shutdown_tx, shutdown_rx) = shutdown_channel();
        let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        shutdown_tx.shutdown();

        let result = tokio::time::timeout(std::time::Duration::from_secs(2), handle).await;
        assert!(result.is_ok(), "worker should stop within 2 seconds");
        assert!(result.unwrap().unwrap().is_ok());
    }
}
