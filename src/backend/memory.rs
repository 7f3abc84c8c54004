//! In-process cache backend using moka.
//!
//! Not distributed: each process keeps its own entries. Suited to single
//! instance deployments and tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;
use serde_json::Value;
use tracing::debug;

use super::{BackendResult, CacheBackend, ValueFormat};

/// Configuration for [`MemoryBackend`].
///
/// ```rust
/// # use querycache::backend::{MemoryConfig, ValueFormat};
/// let config = MemoryConfig::new()
///     .max_entries(1_000)
///     .value_format(ValueFormat::Structured);
/// ```
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
    /// Format returned to the interceptor. Default: serialized text.
    pub value_format: ValueFormat,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            value_format: ValueFormat::Serialized,
        }
    }
}

impl MemoryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of cached entries.
    pub fn max_entries(mut self, n: u64) -> Self {
        self.max_entries = n;
        self
    }

    /// Set the value format reported to the interceptor.
    pub fn value_format(mut self, format: ValueFormat) -> Self {
        self.value_format = format;
        self
    }
}

#[derive(Clone)]
struct StoredEntry {
    value: Arc<str>,
    ttl: Option<Duration>,
}

/// Per-entry expiry: the ttl an entry was last written with, or none.
struct EntryExpiry;

impl Expiry<String, StoredEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &StoredEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &StoredEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// In-memory [`CacheBackend`].
///
/// Entries written with [`set`](CacheBackend::set) never expire; entries
/// written with [`set_with_ttl`](CacheBackend::set_with_ttl) expire after
/// their own ttl. Overwriting an entry replaces its expiry.
#[derive(Clone)]
pub struct MemoryBackend {
    cache: Cache<String, StoredEntry>,
    value_format: ValueFormat,
}

impl MemoryBackend {
    /// Create a backend from the given configuration.
    pub fn new(config: &MemoryConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_entries)
            .expire_after(EntryExpiry)
            .build();

        debug!(
            max_entries = config.max_entries,
            value_format = ?config.value_format,
            "Memory cache backend created"
        );

        Self {
            cache,
            value_format: config.value_format,
        }
    }

    /// Whether `key` currently holds an unexpired entry.
    pub fn contains_key(&self, key: &str) -> bool {
        self.cache.contains_key(key)
    }

    /// Number of entries. May lag behind concurrent writes.
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    async fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let entry = StoredEntry {
            value: Arc::from(value),
            ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new(&MemoryConfig::default())
    }
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("max_capacity", &self.cache.policy().max_capacity())
            .field("entry_count", &self.cache.entry_count())
            .field("value_format", &self.value_format)
            .finish()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn value_format(&self) -> ValueFormat {
        self.value_format
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let result = self.cache.get(key).await.map(|entry| entry.value.to_string());

        if result.is_some() {
            debug!(key = key, "Cache HIT (memory)");
        } else {
            debug!(key = key, "Cache MISS (memory)");
        }

        Ok(result)
    }

    async fn get_structured(&self, key: &str) -> BackendResult<Option<Value>> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        self.insert(key, value, None).await;
        debug!(key = key, "Cache SET (memory)");
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> BackendResult<()> {
        self.insert(key, value, Some(ttl)).await;
        debug!(key = key, ttl_ms = ttl.as_millis() as u64, "Cache SETEX (memory)");
        Ok(())
    }
}
