//! Redis cache backend.
//!
//! Uses `redis::aio::ConnectionManager` for async multiplexed connections
//! with automatic reconnection. Requires the `redis` feature flag.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{BackendResult, CacheBackend};
use crate::error::BackendError;

/// Redis-backed [`CacheBackend`] issuing `GET`, `SET` and `SETEX`.
///
/// Values are stored as the serialized text the interceptor hands over.
#[derive(Clone)]
pub struct RedisBackend {
    connection_manager: ::redis::aio::ConnectionManager,
}

impl std::fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBackend")
            .field("connection_manager", &"ConnectionManager")
            .finish()
    }
}

impl RedisBackend {
    /// Connect to the Redis server at `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> BackendResult<Self> {
        let client = ::redis::Client::open(url).map_err(|e| {
            BackendError::Connection(format!("Failed to create Redis client: {e}"))
        })?;

        let connection_manager = ::redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| BackendError::Connection(format!("Failed to connect to Redis: {e}")))?;

        debug!(url = %redact_url(url), "Redis cache backend connected");

        Ok(Self { connection_manager })
    }

    /// Wrap an existing connection manager.
    pub fn from_connection_manager(connection_manager: ::redis::aio::ConnectionManager) -> Self {
        Self { connection_manager }
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let mut conn = self.connection_manager.clone();
        let result: Option<String> = ::redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| BackendError::Backend(format!("Redis GET failed: {e}")))?;

        if result.is_some() {
            debug!(key = key, "Cache HIT (redis)");
        } else {
            debug!(key = key, "Cache MISS (redis)");
        }

        Ok(result)
    }

    async fn set(&self, key: &str, value: &str) -> BackendResult<()> {
        let mut conn = self.connection_manager.clone();

        ::redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BackendError::Backend(format!("Redis SET failed: {e}")))?;

        debug!(key = key, "Cache SET (redis)");
        Ok(())
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> BackendResult<()> {
        let mut conn = self.connection_manager.clone();
        let ttl_seconds = ttl.as_secs().max(1);

        ::redis::cmd("SETEX")
            .arg(key)
            .arg(ttl_seconds)
            .arg(value)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| BackendError::Backend(format!("Redis SETEX failed: {e}")))?;

        debug!(key = key, ttl_seconds = ttl_seconds, "Cache SETEX (redis)");
        Ok(())
    }
}

/// Mask the password of a connection URL for logging.
pub(crate) fn redact_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@')
        && let Some(colon_pos) = url[..at_pos].rfind(':')
    {
        // `redis://host` has its only colon in the scheme
        if url[..colon_pos].ends_with("redis") || url[..colon_pos].ends_with("rediss") {
            return url.to_string();
        }
        return format!("{}***{}", &url[..=colon_pos], &url[at_pos..]);
    }
    url.to_string()
}
