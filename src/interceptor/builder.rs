//! Builder for configuring interceptor instances

use std::sync::Arc;

use super::CacheInterceptor;
use crate::backend::{CacheBackend, MemoryBackend, MemoryConfig};
use crate::config::{BackendKind, Config};
use crate::dedup::DedupRegistry;
use crate::types::{ReadFailurePolicy, WriteMode};
use crate::{QueryCacheError, Result};

/// Builder for [`CacheInterceptor`].
///
/// ```rust
/// # use querycache::{CacheInterceptor, WriteMode};
/// # use querycache::backend::MemoryConfig;
/// let interceptor = CacheInterceptor::builder()
///     .memory_backend(MemoryConfig::new().max_entries(1_000))
///     .write_mode(WriteMode::Awaited)
///     .build()
///     .unwrap();
/// ```
#[derive(Default)]
pub struct InterceptorBuilder {
    backend: Option<Arc<dyn CacheBackend>>,
    dedup: Option<Arc<DedupRegistry>>,
    write_mode: WriteMode,
    read_failure: ReadFailurePolicy,
}

impl InterceptorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder populated from a loaded [`Config`].
    ///
    /// Connects to Redis when the config selects it; that backend needs
    /// the `redis` cargo feature.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let builder = Self::new()
            .write_mode(config.interceptor.write_mode)
            .read_failure(config.interceptor.read_failure);

        match config.backend.kind {
            BackendKind::Memory => {
                Ok(builder.memory_backend(config.backend.memory.to_memory_config()))
            }
            BackendKind::Redis => {
                let url = config.backend.redis.url.as_str();
                Ok(builder.backend(connect_redis(url).await?))
            }
        }
    }

    /// Use `backend` for explicit caching.
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Use an in-process [`MemoryBackend`].
    pub fn memory_backend(self, config: MemoryConfig) -> Self {
        self.backend(Arc::new(MemoryBackend::new(&config)))
    }

    /// Share an existing dedup registry (e.g. between interceptors).
    pub fn dedup_registry(mut self, registry: Arc<DedupRegistry>) -> Self {
        self.dedup = Some(registry);
        self
    }

    /// Set whether cache writes are awaited (default) or detached.
    pub fn write_mode(mut self, mode: WriteMode) -> Self {
        self.write_mode = mode;
        self
    }

    /// Set the backend read-failure policy (default: fail closed).
    pub fn read_failure(mut self, policy: ReadFailurePolicy) -> Self {
        self.read_failure = policy;
        self
    }

    /// Build the interceptor.
    ///
    /// Fails with [`QueryCacheError::Configuration`] when no backend was set.
    pub fn build(self) -> Result<CacheInterceptor> {
        let backend = self.backend.ok_or_else(|| {
            QueryCacheError::Configuration("no cache backend configured".to_string())
        })?;
        let dedup = self.dedup.unwrap_or_default();
        Ok(CacheInterceptor::new(
            backend,
            dedup,
            self.write_mode,
            self.read_failure,
        ))
    }
}

#[cfg(feature = "redis")]
async fn connect_redis(url: &str) -> Result<Arc<dyn CacheBackend>> {
    let backend = crate::backend::RedisBackend::connect(url)
        .await
        .map_err(|e| QueryCacheError::Configuration(e.to_string()))?;
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "redis"))]
async fn connect_redis(_url: &str) -> Result<Arc<dyn CacheBackend>> {
    Err(QueryCacheError::Configuration(
        "redis backend requires the `redis` feature".to_string(),
    ))
}
