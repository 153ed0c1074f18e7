// Shared harness for integration tests: full in-memory wiring with a
// scripted or delayed generative client standing in for the upstream
// service.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use fabrica_core::application::catalog::register_builtin_schemas;
use fabrica_core::application::handler::HandlerRegistry;
use fabrica_core::application::retry::RetryPolicy;
use fabrica_core::application::{
    InvocationPipeline, JobService, PipelineConfig, SchemaRegistry, Worker,
};
use fabrica_core::port::generative_client::mocks::ScriptedClient;
use fabrica_core::port::id_provider::UuidProvider;
use fabrica_core::port::time_provider::SystemTimeProvider;
use fabrica_core::port::{GenerateError, GenerateRequest, GenerativeClient};
use fabrica_infra_memory::{InMemoryContentCache, InMemoryJobStore, TokenBucketGovernor};

/// Client that sleeps before answering, to hold jobs in Processing long
/// enough for concurrency assertions.
pub struct SlowClient {
    pub delay: Duration,
    pub body: String,
    pub call_count: AtomicUsize,
}

impl SlowClient {
    pub fn new(delay: Duration, body: impl Into<String>) -> Self {
        Self {
            delay,
            body: body.into(),
            call_count: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl GenerativeClient for SlowClient {
    async fn generate(&self, _request: GenerateRequest) -> Result<String, GenerateError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.body.clone())
    }
}

pub struct Harness {
    pub store: Arc<InMemoryJobStore>,
    pub service: Arc<JobService>,
    pub governor: Arc<TokenBucketGovernor>,
    pub workers: Vec<Worker>,
}

/// Build a fully wired engine with `worker_count` workers (the ceiling)
/// over the given client.
pub fn harness(client: Arc<dyn GenerativeClient>, worker_count: usize) -> Harness {
    let time_provider = Arc::new(SystemTimeProvider);

    let registry = Arc::new(SchemaRegistry::new());
    register_builtin_schemas(&registry).unwrap();

    let store = Arc::new(InMemoryJobStore::new());
    let cache = Arc::new(InMemoryContentCache::new(time_provider.clone()));
    // Generous defaults so admission control stays out of the way unless a
    // test wants it.
    let governor = Arc::new(TokenBucketGovernor::new(1_000, 100));
    let handlers = Arc::new(HandlerRegistry::with_builtin());
    let retry_policy = Arc::new(RetryPolicy::new());

    let pipeline = Arc::new(InvocationPipeline::new(
        registry,
        client,
        cache,
        governor.clone(),
        PipelineConfig {
            base_delay_ms: 1,
            ..Default::default()
        },
    ));

    let service = Arc::new(JobService::new(
        store.clone(),
        handlers.clone(),
        governor.clone(),
        Arc::new(UuidProvider),
        time_provider.clone(),
    ));

    let workers = (0..worker_count)
        .map(|_| {
            Worker::new(
                store.clone(),
                handlers.clone(),
                pipeline.clone(),
                retry_policy.clone(),
                time_provider.clone(),
            )
        })
        .collect();

    Harness {
        store,
        service,
        governor,
        workers,
    }
}

pub fn scripted(body: impl Into<String>) -> Arc<ScriptedClient> {
    Arc::new(ScriptedClient::always(body.into()))
}

pub fn valid_outline_body() -> String {
    json!({
        "title": "Learn Rust",
        "overview": "A practical path through the language.",
        "sections": [
            {"heading": "Ownership", "summary": "Moves and borrows"},
            {"heading": "Traits"}
        ]
    })
    .to_string()
}

pub fn outline_params() -> serde_json::Value {
    json!({"title": "Learn Rust"})
}
