// In-Memory JobStore Implementation
//
// One mutex guards the whole table plus the pending queue: status reads
// must be consistent with concurrent transitions, and pop_next_pending
// must hand each queued job to exactly one worker. No lock is ever held
// across an await point.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use fabrica_core::domain::{Job, JobId, JobStatus};
use fabrica_core::error::{AppError, Result};
use fabrica_core::port::JobStore;

#[derive(Default)]
struct State {
    jobs: HashMap<JobId, Job>,
    pending: VecDeque<JobId>,
}

#[derive(Default)]
pub struct InMemoryJobStore {
    state: Mutex<State>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs currently held (any status). Test/ops aid.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.jobs.contains_key(&job.id) {
            return Err(AppError::Conflict(format!("job id {} already exists", job.id)));
        }
        if job.status != JobStatus::Pending {
            return Err(AppError::Conflict(format!(
                "job {} inserted in non-pending status {}",
                job.id, job.status
            )));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        state.pending.push_back(job.id.clone());
        debug!(job_id = %job.id, queue_depth = state.pending.len(), "job enqueued");
        Ok(())
    }

    async fn get(&self, id: &JobId) -> Result<Option<Job>> {
        Ok(self.state.lock().unwrap().jobs.get(id).cloned())
    }

    async fn update(&self, job: &Job) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if !state.jobs.contains_key(&job.id) {
            return Err(AppError::NotFound(format!("job {} not found", job.id)));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn pop_next_pending(&self, now_millis: i64) -> Result<Option<Job>> {
        let mut state = self.state.lock().unwrap();
        let Some(id) = state.pending.pop_front() else {
            return Ok(None);
        };
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| AppError::Store(format!("queued job {} missing from table", id)))?;
        job.start(now_millis)?;
        debug!(job_id = %id, "job dispatched to worker");
        Ok(Some(job.clone()))
    }

    async fn requeue(&self, job: &Job) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if job.status != JobStatus::Pending {
            return Err(AppError::Conflict(format!(
                "job {} requeued in status {}",
                job.id, job.status
            )));
        }
        state.jobs.insert(job.id.clone(), job.clone());
        state.pending.push_back(job.id.clone());
        debug!(job_id = %job.id, retry_count = job.retry_count, "job requeued");
        Ok(())
    }

    async fn take_pending(&self, id: &JobId) -> Result<Option<Job>> {
        let mut state = self.state.lock().unwrap();
        let Some(position) = state.pending.iter().position(|queued| queued == id) else {
            return Ok(None);
        };
        state.pending.remove(position);
        Ok(state.jobs.get(id).cloned())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .jobs
            .values()
            .filter(|job| job.status == status)
            .count() as i64)
    }

    async fn sweep_terminal(&self, now_millis: i64, retention_ms: i64) -> Result<usize> {
        let mut state = self.state.lock().unwrap();
        let before = state.jobs.len();
        state.jobs.retain(|_, job| {
            !(job.is_terminal()
                && job
                    .completed_at
                    .is_some_and(|at| now_millis - at > retention_ms))
        });
        let evicted = before - state.jobs.len();
        if evicted > 0 {
            debug!(evicted, remaining = state.jobs.len(), "terminal jobs evicted");
        }
        Ok(evicted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fabrica_core::domain::JobType;
    use serde_json::json;

    fn pending_job(id: &str) -> Job {
        Job::new(id, 1_000, JobType::Outline, json!({"title": "T"}), 0)
    }

    #[tokio::test]
    async fn insert_and_pop_is_fifo() {
        let store = InMemoryJobStore::new();
        store.insert(&pending_job("a")).await.unwrap();
        store.insert(&pending_job("b")).await.unwrap();

        let first = store.pop_next_pending(2_000).await.unwrap().unwrap();
        assert_eq!(first.id, "a");
        assert_eq!(first.status, JobStatus::Processing);
        assert_eq!(first.started_at, Some(2_000));

        let second = store.pop_next_pending(2_100).await.unwrap().unwrap();
        assert_eq!(second.id, "b");
        assert!(store.pop_next_pending(2_200).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_a_conflict() {
        let store = InMemoryJobStore::new();
        store.insert(&pending_job("a")).await.unwrap();
        let err = store.insert(&pending_job("a")).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn take_pending_removes_from_queue_only_while_pending() {
        let store = InMemoryJobStore::new();
        store.insert(&pending_job("a")).await.unwrap();

        let taken = store.take_pending(&"a".to_string()).await.unwrap();
        assert!(taken.is_some());
        // Queue no longer dispatches it.
        assert!(store.pop_next_pending(2_000).await.unwrap().is_none());
        // Second take finds nothing queued.
        assert!(store.take_pending(&"a".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn take_pending_misses_processing_jobs() {
        let store = InMemoryJobStore::new();
        store.insert(&pending_job("a")).await.unwrap();
        store.pop_next_pending(2_000).await.unwrap();
        assert!(store.take_pending(&"a".to_string()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_pops_never_hand_out_duplicates() {
        use std::sync::Arc;
        let store = Arc::new(InMemoryJobStore::new());
        for i in 0..20 {
            store.insert(&pending_job(&format!("job-{}", i))).await.unwrap();
        }

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..5 {
            let store = Arc::clone(&store);
            tasks.spawn(async move {
                let mut seen = Vec::new();
                while let Some(job) = store.pop_next_pending(2_000).await.unwrap() {
                    seen.push(job.id);
                }
                seen
            });
        }

        let mut all = Vec::new();
        while let Some(result) = tasks.join_next().await {
            all.extend(result.unwrap());
        }
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 20, "every job dispatched exactly once");
    }

    #[tokio::test]
    async fn sweep_respects_retention_window() {
        let store = InMemoryJobStore::new();
        let mut job = pending_job("a");
        store.insert(&job).await.unwrap();
        store.pop_next_pending(1_500).await.unwrap();
        job.start(1_500).unwrap();
        job.complete(2_000, json!({}), false).unwrap();
        store.update(&job).await.unwrap();

        assert_eq!(store.sweep_terminal(30_000, 60_000).await.unwrap(), 0);
        assert_eq!(store.sweep_terminal(100_000, 60_000).await.unwrap(), 1);
        assert!(store.is_empty());
    }
}
