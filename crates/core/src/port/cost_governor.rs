// Cost/Rate Governor Port
// Usage accounting plus per-user admission control, consumed at job
// creation and on every pipeline attempt.

use async_trait::async_trait;

/// Admission decision for a (user, request class) pair.
#[derive(Debug, Clone)]
pub struct Admission {
    pub allowed: bool,
    /// Backoff hint when refused.
    pub retry_after_ms: Option<i64>,
}

impl Admission {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after_ms: None,
        }
    }

    pub fn refused(retry_after_ms: i64) -> Self {
        Self {
            allowed: false,
            retry_after_ms: Some(retry_after_ms),
        }
    }
}

#[async_trait]
pub trait CostGovernor: Send + Sync {
    /// Record one invocation's token usage. `cached` marks hits that cost
    /// zero upstream calls.
    async fn record_usage(&self, request_class: &str, tokens_in: u64, tokens_out: u64, cached: bool);

    /// Admission check before accepting new work for `user_id`.
    async fn check_admission(&self, user_id: &str, request_class: &str) -> Admission;
}

pub mod mocks {
    use super::*;

    /// Governor that admits everything and forgets usage.
    pub struct AllowAllGovernor;

    #[async_trait]
    impl CostGovernor for AllowAllGovernor {
        async fn record_usage(&self, _class: &str, _in: u64, _out: u64, _cached: bool) {}

        async fn check_admission(&self, _user_id: &str, _class: &str) -> Admission {
            Admission::allowed()
        }
    }
}
