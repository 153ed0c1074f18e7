// Content Cache Port
// Consumed by the invocation pipeline; keyed by a fingerprint of the
// normalized request content. A hit short-circuits the upstream call.

use async_trait::async_trait;
use serde_json::Value;

/// Lookup parameters for a cache read.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    /// Request class (usually the schema name); keys both the cache
    /// partition and the usage accounting.
    pub request_class: String,
    pub normalized_content: String,
    /// Whether a fuzzy-similarity scan may satisfy this lookup when the
    /// exact fingerprint misses.
    pub allow_fuzzy: bool,
    /// Minimum similarity for a fuzzy hit (0.0 - 1.0).
    pub similarity_threshold: f64,
}

#[async_trait]
pub trait ContentCache: Send + Sync {
    /// Exact-fingerprint lookup, falling back to similarity search when
    /// the lookup allows it. None on miss.
    async fn get(&self, lookup: &CacheLookup) -> Option<Value>;

    /// Write-through after a successful (validated or repaired) invocation.
    async fn set(&self, request_class: &str, normalized_content: &str, payload: Value, ttl_ms: i64);
}

pub mod mocks {
    use super::*;

    /// Cache that never hits and drops writes. For tests that pin the
    /// number of upstream calls without cache interference.
    pub struct NullCache;

    #[async_trait]
    impl ContentCache for NullCache {
        async fn get(&self, _lookup: &CacheLookup) -> Option<Value> {
            None
        }

        async fn set(&self, _class: &str, _content: &str, _payload: Value, _ttl_ms: i64) {}
    }
}
