// In-Memory Content Cache
//
// Entries are partitioned by request class and keyed by an xxh3-64
// fingerprint of the normalized content. Exact lookup first; when the
// lookup allows it, a fuzzy pass scans the most recent entries of the
// class and accepts the best Jaccard token similarity above the
// threshold. TTL expiry is lazy, applied on read and write.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use xxhash_rust::xxh3::xxh3_64;

use fabrica_core::port::{CacheLookup, ContentCache, TimeProvider};

/// Most recent entries per class considered by the fuzzy pass.
const FUZZY_SCAN_LIMIT: usize = 128;

/// Hard cap on entries per class; oldest are dropped beyond it.
const CLASS_CAPACITY: usize = 512;

struct CacheEntry {
    payload: Value,
    normalized_input: String,
    tokens: HashSet<String>,
    created_at: i64,
    ttl_ms: i64,
}

impl CacheEntry {
    fn expired(&self, now_millis: i64) -> bool {
        now_millis - self.created_at > self.ttl_ms
    }
}

#[derive(Default)]
struct ClassShard {
    by_fingerprint: HashMap<u64, CacheEntry>,
    /// Insertion order, newest at the back.
    recent: VecDeque<u64>,
}

pub struct InMemoryContentCache {
    shards: Mutex<HashMap<String, ClassShard>>,
    time_provider: Arc<dyn TimeProvider>,
}

impl InMemoryContentCache {
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            shards: Mutex::new(HashMap::new()),
            time_provider,
        }
    }

    pub fn fingerprint(normalized_content: &str) -> u64 {
        xxh3_64(normalized_content.as_bytes())
    }

    /// Entries currently held for a class. Test/ops aid.
    pub fn class_len(&self, request_class: &str) -> usize {
        self.shards
            .lock()
            .unwrap()
            .get(request_class)
            .map_or(0, |shard| shard.by_fingerprint.len())
    }
}

fn token_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_string).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

#[async_trait]
impl ContentCache for InMemoryContentCache {
    async fn get(&self, lookup: &CacheLookup) -> Option<Value> {
        let now = self.time_provider.now_millis();
        let mut shards = self.shards.lock().unwrap();
        let shard = shards.get_mut(&lookup.request_class)?;

        // Exact fingerprint match.
        let fingerprint = Self::fingerprint(&lookup.normalized_content);
        if let Some(entry) = shard.by_fingerprint.get(&fingerprint) {
            if entry.expired(now) {
                shard.by_fingerprint.remove(&fingerprint);
                shard.recent.retain(|fp| *fp != fingerprint);
            } else {
                debug!(request_class = %lookup.request_class, "exact cache hit");
                return Some(entry.payload.clone());
            }
        }

        if !lookup.allow_fuzzy {
            return None;
        }

        // Fuzzy pass over the most recent live entries.
        let probe = token_set(&lookup.normalized_content);
        let mut best: Option<(f64, u64)> = None;
        for fp in shard.recent.iter().rev().take(FUZZY_SCAN_LIMIT) {
            let Some(entry) = shard.by_fingerprint.get(fp) else {
                continue;
            };
            if entry.expired(now) {
                continue;
            }
            let similarity = jaccard(&probe, &entry.tokens);
            if similarity >= lookup.similarity_threshold
                && best.map_or(true, |(score, _)| similarity > score)
            {
                best = Some((similarity, *fp));
            }
        }

        best.and_then(|(similarity, fp)| {
            shard.by_fingerprint.get(&fp).map(|entry| {
                debug!(
                    request_class = %lookup.request_class,
                    similarity,
                    stored_input_len = entry.normalized_input.len(),
                    "fuzzy cache hit"
                );
                entry.payload.clone()
            })
        })
    }

    async fn set(&self, request_class: &str, normalized_content: &str, payload: Value, ttl_ms: i64) {
        let now = self.time_provider.now_millis();
        let fingerprint = Self::fingerprint(normalized_content);
        let mut shards = self.shards.lock().unwrap();
        let shard = shards.entry(request_class.to_string()).or_default();

        // Lazy expiry on write keeps shards bounded even without reads.
        let expired: Vec<u64> = shard
            .by_fingerprint
            .iter()
            .filter(|(_, entry)| entry.expired(now))
            .map(|(fp, _)| *fp)
            .collect();
        for fp in expired {
            shard.by_fingerprint.remove(&fp);
            shard.recent.retain(|queued| *queued != fp);
        }

        shard.recent.retain(|queued| *queued != fingerprint);
        shard.recent.push_back(fingerprint);
        shard.by_fingerprint.insert(
            fingerprint,
            CacheEntry {
                payload,
                normalized_input: normalized_content.to_string(),
                tokens: token_set(normalized_content),
                created_at: now,
                ttl_ms,
            },
        );

        while shard.by_fingerprint.len() > CLASS_CAPACITY {
            let Some(oldest) = shard.recent.pop_front() else {
                break;
            };
            shard.by_fingerprint.remove(&oldest);
        }
    }
}
