// Job Store Port (Interface)
//
// The job table and pending queue live behind this port. Implementations
// must make pop_next_pending atomic: a job is either still queued or
// Processing for exactly one worker, never both.

use crate::domain::{Job, JobId, JobStatus};
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new Pending job and enqueue it (FIFO).
    async fn insert(&self, job: &Job) -> Result<()>;

    /// Find job by ID
    async fn get(&self, id: &JobId) -> Result<Option<Job>>;

    /// Update job
    async fn update(&self, job: &Job) -> Result<()>;

    /// Pop the oldest Pending job and mark it Processing, atomically.
    /// Returns None when the queue is empty.
    async fn pop_next_pending(&self, now_millis: i64) -> Result<Option<Job>>;

    /// Put a job back at the tail of the pending queue (retry requeue).
    /// The job must already be in Pending state.
    async fn requeue(&self, job: &Job) -> Result<()>;

    /// Remove a still-Pending job from the queue without executing it.
    /// Returns the job if it was pending, None otherwise.
    async fn take_pending(&self, id: &JobId) -> Result<Option<Job>>;

    /// Count jobs by status
    async fn count_by_status(&self, status: JobStatus) -> Result<i64>;

    /// Evict jobs that have been terminal for longer than `retention_ms`.
    /// Returns the number of evicted jobs.
    async fn sweep_terminal(&self, now_millis: i64, retention_ms: i64) -> Result<usize>;
}

// ============================================================================
// Test Double
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Minimal in-memory store for core unit tests. The production store
    /// (fabrica-infra-memory) adds tracing and eviction bookkeeping; the
    /// locking discipline is the same: one mutex over table + queue.
    #[derive(Default)]
    pub struct TestJobStore {
        state: Mutex<State>,
    }

    #[derive(Default)]
    struct State {
        jobs: HashMap<JobId, Job>,
        pending: VecDeque<JobId>,
    }

    impl TestJobStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl JobStore for TestJobStore {
        async fn insert(&self, job: &Job) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.jobs.insert(job.id.clone(), job.clone());
            state.pending.push_back(job.id.clone());
            Ok(())
        }

        async fn get(&self, id: &JobId) -> Result<Option<Job>> {
            Ok(self.state.lock().unwrap().jobs.get(id).cloned())
        }

        async fn update(&self, job: &Job) -> Result<()> {
            self.state
                .lock()
                .unwrap()
                .jobs
                .insert(job.id.clone(), job.clone());
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
                .ok_or_else(|| crate::error::AppError::Store(format!("queued ghost {}", id)))?;
            job.start(now_millis).map_err(crate::error::AppError::Domain)?;
            Ok(Some(job.clone()))
        }

        async fn requeue(&self, job: &Job) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.jobs.insert(job.id.clone(), job.clone());
            state.pending.push_back(job.id.clone());
            Ok(())
        }

        async fn take_pending(&self, id: &JobId) -> Result<Option<Job>> {
            let mut state = self.state.lock().unwrap();
            let Some(position) = state.pending.iter().position(|p| p == id) else {
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
                .filter(|j| j.status == status)
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
            Ok(before - state.jobs.len())
        }
    }
}
