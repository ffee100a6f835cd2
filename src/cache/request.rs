//! Memo table for generated text.
//!
//! Keys come from [`make_key()`], a SHA-256 digest over a length-prefixed
//! encoding of the prompt, each history message's role and content, and
//! the option values. Structurally equal inputs always hash the same; the
//! length prefixes keep `("ab", "c")` and `("a", "bc")` apart.

use std::sync::{Arc, OnceLock};
use std::time::Instant;

use moka::future::Cache;
use sha2::{Digest, Sha256};

use crate::telemetry;
use crate::types::{GenerationOptions, Message};

/// Default maximum number of cached generations.
pub const DEFAULT_CAPACITY: u64 = 1_000;

/// Bumped whenever the key encoding changes.
const KEY_SCHEME: &[u8] = b"vedanta-generate-v1";

/// Tag for keys bound to a model and system prompt.
const SCOPED_KEY_SCHEME: &[u8] = b"vedanta-generate-scoped-v1";

static SHARED_CACHE: OnceLock<Arc<RequestCache>> = OnceLock::new();

/// One cached generation.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub inserted_at: Instant,
}

/// Bounded in-memory cache of generated text.
///
/// Safe under concurrent use; concurrent writers of the same key resolve
/// last-writer-wins. Only successful generations are ever stored.
pub struct RequestCache {
    cache: Cache<String, CacheEntry>,
    capacity: u64,
}

impl RequestCache {
    /// Create a cache holding up to [`DEFAULT_CAPACITY`] entries.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a cache holding up to `capacity` entries.
    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            cache: Cache::new(capacity),
            capacity,
        }
    }

    /// The process-wide cache, created on first use.
    pub fn shared() -> Arc<Self> {
        SHARED_CACHE.get_or_init(|| Arc::new(Self::new())).clone()
    }

    /// Look up cached text. Emits cache hit/miss metrics.
    pub async fn get(&self, key: &str) -> Option<String> {
        self.get_entry(key).await.map(|entry| entry.value)
    }

    /// Look up the full entry, including when it was stored.
    pub async fn get_entry(&self, key: &str) -> Option<CacheEntry> {
        let hit = self.cache.get(key).await;
        let name = if hit.is_some() {
            telemetry::CACHE_HITS_TOTAL
        } else {
            telemetry::CACHE_MISSES_TOTAL
        };
        metrics::counter!(name, "operation" => "generate").increment(1);
        hit
    }

    /// Insert or overwrite `key`.
    pub async fn put(&self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let entry = CacheEntry {
            key: key.clone(),
            value: value.into(),
            inserted_at: Instant::now(),
        };
        self.cache.insert(key, entry).await;
    }

    /// Number of entries. Eventually consistent; call
    /// [`run_pending_tasks()`](Self::run_pending_tasks) first for an exact count.
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured maximum number of entries.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Apply pending inserts and evictions.
    pub async fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks().await;
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic cache key for one generate call.
///
/// Depends only on values: equal prompts, role/content sequences, and
/// option values produce the same key regardless of object identity.
pub fn make_key(prompt: &str, history: &[Message], options: &GenerationOptions) -> String {
    let mut hasher = Sha256::new();
    hasher.update(KEY_SCHEME);

    write_field(&mut hasher, prompt.as_bytes());

    hasher.update((history.len() as u64).to_le_bytes());
    for message in history {
        write_field(&mut hasher, message.role.as_str().as_bytes());
        write_field(&mut hasher, message.content.as_bytes());
    }

    hasher.update(float_bits(options.temperature).to_le_bytes());
    hasher.update(options.max_tokens.to_le_bytes());
    hasher.update(float_bits(options.top_p).to_le_bytes());

    format!("{:x}", hasher.finalize())
}

/// [`make_key()`] bound to the model and system prompt that answer it.
///
/// Clients sharing one cache but talking to different models, or with
/// different system prompts, never see each other's entries.
pub fn make_scoped_key(
    model: &str,
    system_prompt: &str,
    prompt: &str,
    history: &[Message],
    options: &GenerationOptions,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(SCOPED_KEY_SCHEME);
    write_field(&mut hasher, model.as_bytes());
    write_field(&mut hasher, system_prompt.as_bytes());
    write_field(&mut hasher, make_key(prompt, history, options).as_bytes());
    format!("{:x}", hasher.finalize())
}

fn write_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

// -0.0 and 0.0 compare equal, so they must hash equal.
fn float_bits(v: f32) -> u32 {
    if v == 0.0 { 0 } else { v.to_bits() }
}
