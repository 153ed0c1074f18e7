// Worker constants (no magic values in the loop body)
use std::time::Duration;

/// Sleep duration when no jobs are available (100ms)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_millis(100);

/// Sleep duration after a worker error before retrying the loop (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Default worker-pool size; the concurrency ceiling.
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default job-level requeue budget (Failed -> Pending edges).
pub const DEFAULT_JOB_MAX_RETRIES: i32 = 2;

/// Default retention window for terminal jobs (30 minutes)
pub const DEFAULT_RETENTION_MS: i64 = 30 * 60 * 1000;

/// Default sweep cadence (1 minute)
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;
