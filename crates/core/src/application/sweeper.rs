// Retention Sweeper
//
// Periodic background task evicting jobs that have been terminal for
// longer than the retention window, bounding the volatile job table.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::application::worker::ShutdownToken;
use crate::error::Result;
use crate::port::{JobStore, TimeProvider};

pub struct RetentionSweeper {
    store: Arc<dyn JobStore>,
    time_provider: Arc<dyn TimeProvider>,
    retention_ms: i64,
    sweep_interval: Duration,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn JobStore>,
        time_provider: Arc<dyn TimeProvider>,
        retention_ms: i64,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            store,
            time_provider,
            retention_ms,
            sweep_interval,
        }
    }

    /// Run the sweep loop. Should be spawned in tokio::spawn.
    pub async fn run(self, mut shutdown: ShutdownToken) {
        info!(
            retention_ms = self.retention_ms,
            interval_ms = self.sweep_interval.as_millis() as u64,
            "Retention sweeper started"
        );

        let mut tick = interval(self.sweep_interval);
        // The first tick fires immediately; skip it so a fresh start
        // doesn't race job creation in tests.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.run_now().await {
                        error!(error = %e, "Retention sweep failed");
                    }
                }
                _ = shutdown.wait() => {
                    info!("Retention sweeper shutting down");
                    break;
                }
            }
        }
    }

    /// Run one sweep immediately.
    pub async fn run_now(&self) -> Result<usize> {
        let now = self.time_provider.now_millis();
        let evicted = self.store.sweep_terminal(now, self.retention_ms).await?;
        if evicted > 0 {
            info!(evicted, "Evicted terminal jobs past retention");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Job, JobError, JobType};
    use crate::port::job_store::mocks::TestJobStore;
    use crate::port::TimeProvider;
    use serde_json::json;

    struct FixedClock(i64);
    impl TimeProvider for FixedClock {
        fn now_millis(&self) -> i64 {
            self.0
        }
    }

    #[tokio::test]
    async fn sweeps_only_jobs_past_retention() {
        let store = Arc::new(TestJobStore::new());

        // Terminal long ago.
        let mut old = Job::new("old", 0, JobType::Outline, json!({"title": "T"}), 0);
        store.insert(&old).await.unwrap();
        store.pop_next_pending(10).await.unwrap();
        old.start(10).unwrap();
        old.complete(20, json!({}), false).unwrap();
        store.update(&old).await.unwrap();

        // Terminal recently.
        let mut fresh = Job::new("fresh", 0, JobType::Outline, json!({"title": "T"}), 0);
        store.insert(&fresh).await.unwrap();
        store.pop_next_pending(10).await.unwrap();
        fresh.start(10).unwrap();
        fresh
            .fail(
                90_000,
                JobError {
                    message: "x".into(),
                    kind: "timeout".into(),
                    timestamp: 90_000,
                },
            )
            .unwrap();
        store.update(&fresh).await.unwrap();

        // Still pending.
        let pending = Job::new("pending", 0, JobType::Outline, json!({"title": "T"}), 0);
        store.insert(&pending).await.unwrap();

        let sweeper = RetentionSweeper::new(
            store.clone(),
            Arc::new(FixedClock(100_000)),
            60_000,
            Duration::from_secs(60),
        );

        assert_eq!(sweeper.run_now().await.unwrap(), 1);
        assert!(store.get(&"old".to_string()).await.unwrap().is_none());
        assert!(store.get(&"fresh".to_string()).await.unwrap().is_some());
        assert!(store.get(&"pending".to_string()).await.unwrap().is_some());
    }
}
