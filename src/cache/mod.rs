//! Caching subsystem.
//!
//! Two independent in-memory caches:
//!
//! - [`RequestCache`]: memoises generated text keyed by a digest of
//!   (prompt, history, options). Shared process-wide by default; a cache
//!   hit skips the network, the pool, and the retry controller entirely.
//!
//! - [`EmbeddingCache`]: memoises embedding vectors per (model, text).
//!   Owned by a single client.
//!
//! Neither cache expires entries on a clock. Staleness is accepted: a hit
//! returns exactly what the backend produced when the entry was stored.
//! Memory stays bounded by a capacity limit (moka's TinyLFU admission with
//! LRU eviction).

mod request;

pub use request::{CacheEntry, DEFAULT_CAPACITY, RequestCache, make_key, make_scoped_key};

use sha2::{Digest, Sha256};

use crate::telemetry;

/// Default maximum number of entries in the embedding cache.
const DEFAULT_EMBEDDING_CACHE_MAX: u64 = 1_000;

/// Thread-safe store for embedding vectors.
pub struct EmbeddingCache {
    entries: moka::sync::Cache<String, Vec<f32>>,
}

impl EmbeddingCache {
    /// Create an empty cache with the default max capacity (1,000).
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_EMBEDDING_CACHE_MAX)
    }

    /// Create a cache with a custom max capacity.
    pub fn with_max_entries(max: u64) -> Self {
        Self {
            entries: moka::sync::Cache::new(max),
        }
    }

    /// Look up a cached embedding. Returns `None` on cache miss.
    pub fn get(&self, model: &str, text: &str) -> Option<Vec<f32>> {
        let hit = self.entries.get(&embedding_key(model, text));
        let name = if hit.is_some() {
            telemetry::CACHE_HITS_TOTAL
        } else {
            telemetry::CACHE_MISSES_TOTAL
        };
        metrics::counter!(name, "operation" => "embed").increment(1);
        hit
    }

    /// Insert (or overwrite) an embedding.
    pub fn insert(&self, model: &str, text: &str, values: Vec<f32>) {
        self.entries.insert(embedding_key(model, text), values);
    }

    /// Number of entries currently in the cache (eventually consistent).
    pub fn len(&self) -> u64 {
        self.entries.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new()
    }
}

fn embedding_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update((model.len() as u64).to_le_bytes());
    hasher.update(model.as_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
