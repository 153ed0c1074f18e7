// Token-Bucket Cost Governor
//
// Admission control is a per-user token bucket; usage accounting is a
// per-class tally. The bucket state packs tokens and the last refill
// timestamp into one AtomicU64 updated by a CAS loop, so admission checks
// from every concurrent invocation never contend on a lock.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;

use async_trait::async_trait;
use tracing::debug;

use fabrica_core::port::{Admission, CostGovernor};

/// Per-class usage tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageTotals {
    pub calls: u64,
    pub cached_hits: u64,
    pub tokens_in: u64,
    pub tokens_out: u64,
}

struct BucketState {
    // Upper 32 bits: whole tokens. Lower 32 bits: last-refill offset in ms
    // from `creation_time`.
    packed: AtomicU64,
    creation_time: Instant,
}

pub struct TokenBucketGovernor {
    buckets: RwLock<HashMap<String, Arc<BucketState>>>,
    usage: Mutex<HashMap<String, UsageTotals>>,
    max_tokens: u32,
    refill_rate: u32, // tokens per second
}

impl TokenBucketGovernor {
    /// # Arguments
    /// * `max_tokens` - Maximum burst size per user
    /// * `refill_rate` - Tokens added per second per user
    pub fn new(max_tokens: u32, refill_rate: u32) -> Self {
        assert!(refill_rate > 0, "refill_rate must be positive");
        Self {
            buckets: RwLock::new(HashMap::new()),
            usage: Mutex::new(HashMap::new()),
            max_tokens,
            refill_rate,
        }
    }

    fn bucket_for(&self, user_id: &str) -> Arc<BucketState> {
        if let Some(bucket) = self.buckets.read().unwrap().get(user_id) {
            return Arc::clone(bucket);
        }
        let mut buckets = self.buckets.write().unwrap();
        Arc::clone(buckets.entry(user_id.to_string()).or_insert_with(|| {
            Arc::new(BucketState {
                packed: AtomicU64::new((self.max_tokens as u64) << 32),
                creation_time: Instant::now(),
            })
        }))
    }

    /// Try to consume one token; CAS loop, no locks.
    fn try_consume(&self, bucket: &BucketState) -> bool {
        loop {
            let packed = bucket.packed.load(Ordering::Acquire);
            let tokens = (packed >> 32) as u32;
            let last_refill_ms = (packed & 0xFFFF_FFFF) as u32;

            let elapsed_ms = bucket.creation_time.elapsed().as_millis() as u32;
            let delta_ms = elapsed_ms.saturating_sub(last_refill_ms);

            let tokens_to_add = (delta_ms as u64 * self.refill_rate as u64) / 1000;
            let new_tokens = ((tokens as u64 + tokens_to_add).min(self.max_tokens as u64)) as u32;

            if new_tokens >= 1 {
                let consumed = new_tokens - 1;
                let new_packed = ((consumed as u64) << 32) | (elapsed_ms as u64);
                match bucket.packed.compare_exchange(
                    packed,
                    new_packed,
                    Ordering::Release,
                    Ordering::Acquire,
                ) {
                    Ok(_) => return true,
                    Err(_) => continue, // Retry
                }
            } else {
                // Not enough tokens; still publish the refill timestamp.
                let new_packed = ((new_tokens as u64) << 32) | (elapsed_ms as u64);
                let _ = bucket.packed.compare_exchange(
                    packed,
                    new_packed,
                    Ordering::Release,
                    Ordering::Acquire,
                );
                return false;
            }
        }
    }

    /// Accumulated usage for a request class.
    pub fn totals(&self, request_class: &str) -> UsageTotals {
        self.usage
            .lock()
            .unwrap()
            .get(request_class)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CostGovernor for TokenBucketGovernor {
    async fn record_usage(&self, request_class: &str, tokens_in: u64, tokens_out: u64, cached: bool) {
        let mut usage = self.usage.lock().unwrap();
        let totals = usage.entry(request_class.to_string()).or_default();
        if cached {
            totals.cached_hits += 1;
        } else {
            totals.calls += 1;
        }
        totals.tokens_in += tokens_in;
        totals.tokens_out += tokens_out;
    }

    async fn check_admission(&self, user_id: &str, request_class: &str) -> Admission {
        let bucket = self.bucket_for(user_id);
        if self.try_consume(&bucket) {
            Admission::allowed()
        } else {
            // One token refills in 1000/rate ms.
            let retry_after_ms = (1_000 / self.refill_rate as i64).max(1);
            debug!(
                user_id,
                request_class, retry_after_ms, "admission refused, bucket empty"
            );
            Admission::refused(retry_after_ms)
        }
    }
}
