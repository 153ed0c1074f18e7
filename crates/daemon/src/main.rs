//! Fabrica Generation Engine - Main Entry Point
//! JSON-RPC server + worker pool + retention sweeper, wired in one place.

mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fabrica_api_rpc::{RpcServer, RpcServerConfig};
use fabrica_core::application::catalog::register_builtin_schemas;
use fabrica_core::application::handler::HandlerRegistry;
use fabrica_core::application::retry::RetryPolicy;
use fabrica_core::application::worker::constants::{
    DEFAULT_RETENTION_MS, DEFAULT_SWEEP_INTERVAL_MS, DEFAULT_WORKER_COUNT,
};
use fabrica_core::application::{
    shutdown_channel, spawn_worker_pool, InvocationPipeline, JobService, PipelineConfig,
    RetentionSweeper, SchemaRegistry,
};
use fabrica_core::port::id_provider::UuidProvider;
use fabrica_core::port::time_provider::SystemTimeProvider;
use fabrica_infra_llm::{HttpGenerativeClient, HttpGenerativeClientConfig};
use fabrica_infra_memory::{InMemoryContentCache, InMemoryJobStore, TokenBucketGovernor};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize logging (pretty for development, JSON for production)
    let log_format = std::env::var("FABRICA_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("fabrica=info"))
        .expect("Failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("Fabrica Generation Engine v{} starting...", VERSION);

    // 1.1. Initialize OpenTelemetry (optional)
    if let Err(e) = telemetry::init_telemetry() {
        tracing::warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    }

    // 2. Load configuration from environment
    let rpc_port: u16 = env_parsed("FABRICA_RPC_PORT", 9630);
    let worker_count: usize = env_parsed("FABRICA_WORKERS", DEFAULT_WORKER_COUNT);
    let retention_ms: i64 = env_parsed("FABRICA_RETENTION_MS", DEFAULT_RETENTION_MS);
    let governor_burst: u32 = env_parsed("FABRICA_GOVERNOR_BURST", 30);
    let governor_rate: u32 = env_parsed("FABRICA_GOVERNOR_RATE", 2);

    let pipeline_config = PipelineConfig {
        max_retries: env_parsed("FABRICA_PIPELINE_RETRIES", 2),
        ..Default::default()
    };

    // 3. Build the generative client. A missing API key is fatal here:
    // there is no point accepting jobs that can never run.
    let client = HttpGenerativeClient::new(HttpGenerativeClientConfig {
        endpoint: std::env::var("FABRICA_ENDPOINT")
            .unwrap_or_else(|_| HttpGenerativeClientConfig::default().endpoint),
        api_key: std::env::var("FABRICA_API_KEY").ok(),
        model: std::env::var("FABRICA_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        timeout_secs: env_parsed("FABRICA_UPSTREAM_TIMEOUT_SECS", 60),
    })
    .map_err(|e| anyhow::anyhow!("generative client init failed: {}", e))?;

    // 4. Setup dependencies (DI wiring)
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(UuidProvider);

    let schema_registry = Arc::new(SchemaRegistry::new());
    register_builtin_schemas(&schema_registry)
        .map_err(|e| anyhow::anyhow!("schema registration failed: {}", e))?;

    let store = Arc::new(InMemoryJobStore::new());
    let cache = Arc::new(InMemoryContentCache::new(time_provider.clone()));
    let governor = Arc::new(TokenBucketGovernor::new(governor_burst, governor_rate));
    let handlers = Arc::new(HandlerRegistry::with_builtin());
    let retry_policy = Arc::new(RetryPolicy::new());

    let pipeline = Arc::new(InvocationPipeline::new(
        schema_registry,
        Arc::new(client),
        cache.clone(),
        governor.clone(),
        pipeline_config,
    ));

    let service = Arc::new(JobService::new(
        store.clone(),
        handlers.clone(),
        governor,
        id_provider,
        time_provider.clone(),
    ));

    // 5. Start JSON-RPC server
    info!("Starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(rpc_config, service);
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    // 6. Start worker pool (the concurrency ceiling)
    info!(worker_count, "Starting worker pool...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let worker_handles = spawn_worker_pool(
        worker_count,
        store.clone(),
        handlers,
        pipeline,
        retry_policy,
        time_provider.clone(),
        shutdown_rx.clone(),
    );

    // 7. Start retention sweeper
    let sweeper = RetentionSweeper::new(
        store,
        time_provider,
        retention_ms,
        Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
    );
    tokio::spawn(sweeper.run(shutdown_rx));

    info!("System ready. Waiting for jobs...");
    info!("Press Ctrl+C to shutdown");

    // 8. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received. Exiting gracefully...");

    // 9. Graceful shutdown
    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    for handle in worker_handles {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    info!("Shutdown complete.");

    Ok(())
}
