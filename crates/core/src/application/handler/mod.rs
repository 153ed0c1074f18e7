// Job Handlers
//
// Each JobType is bound ahead of time to a handler that validates the
// job's minimal param shape, emits progress updates, and drives one or
// more pipeline invocations. Dispatch is a closed-enum table looked up
// once per job, never string branching in the execution path.

mod flashcards;
mod lesson_plan;
mod outline;

pub use flashcards::FlashcardsHandler;
pub use lesson_plan::LessonPlanHandler;
pub use outline::OutlineHandler;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::application::pipeline::{InvocationPipeline, InvokeError};
use crate::domain::{DomainError, Job, JobId, JobProgress, JobType};
use crate::port::JobStore;

/// Execution context handed to a handler.
pub struct HandlerContext {
    pub job_id: JobId,
    pub params: Value,
    pub user_id: Option<String>,
    pipeline: Arc<InvocationPipeline>,
    store: Arc<dyn JobStore>,
}

impl HandlerContext {
    pub fn new(job: &Job, pipeline: Arc<InvocationPipeline>, store: Arc<dyn JobStore>) -> Self {
        Self {
            job_id: job.id.clone(),
            params: job.params.clone(),
            user_id: job.user_id.clone(),
            pipeline,
            store,
        }
    }

    pub fn pipeline(&self) -> &InvocationPipeline {
        &self.pipeline
    }

    /// Publish a progress update. Best-effort: a lost update must never
    /// fail the job itself.
    pub async fn progress(&self, stage: &str, message: &str, percent: u8) {
        match self.store.get(&self.job_id).await {
            Ok(Some(mut job)) => {
                job.progress = JobProgress {
                    stage: stage.to_string(),
                    message: message.to_string(),
                    percent,
                };
                if let Err(e) = self.store.update(&job).await {
                    warn!(job_id = %self.job_id, error = %e, "progress update dropped");
                }
            }
            Ok(None) => warn!(job_id = %self.job_id, "progress update for unknown job"),
            Err(e) => warn!(job_id = %self.job_id, error = %e, "progress update dropped"),
        }
    }
}

/// Final output of a handler run.
pub struct HandlerOutput {
    pub result: Value,
    /// Any pipeline call along the way needed the repair pass.
    pub repaired: bool,
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Minimal param-shape check applied at job creation, before anything
    /// is enqueued.
    fn validate_params(&self, params: &Value) -> Result<(), DomainError>;

    async fn run(&self, ctx: &HandlerContext) -> Result<HandlerOutput, InvokeError>;
}

/// JobType -> handler dispatch table, built once at startup.
pub struct HandlerRegistry {
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type, handler);
    }

    /// Registry with every built-in handler bound.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(JobType::Outline, Arc::new(OutlineHandler));
        registry.register(JobType::Flashcards, Arc::new(FlashcardsHandler));
        registry.register(JobType::LessonPlan, Arc::new(LessonPlanHandler));
        registry
    }

    pub fn get(&self, job_type: JobType) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(&job_type).cloned()
    }

    pub fn validate_params(&self, job_type: JobType, params: &Value) -> Result<(), DomainError> {
        match self.handlers.get(&job_type) {
            Some(handler) => handler.validate_params(params),
            None => Err(DomainError::UnknownJobType(job_type.to_string())),
        }
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}

/// Shared param helper: a required non-empty string field.
pub(crate) fn require_non_empty(params: &Value, field: &str) -> Result<String, DomainError> {
    params
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            DomainError::ValidationError(format!("params.{} must be a non-empty string", field))
        })
}
