//! Cache backends.
//!
//! A [`CacheBackend`] is a thin contract over a key-value store: get, set,
//! and set-with-ttl of serialized values. Backends never interpret what
//! they store; encoding and decoding belong to the
//! [`CacheInterceptor`](crate::CacheInterceptor).
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryBackend`]: in-process moka cache with per-entry expiry.
//! - `RedisBackend`: `GET`/`SET`/`SETEX` over a multiplexed connection
//!   (cargo feature `redis`).
//!
//! # Value format
//!
//! Some stores hand back already-decoded values. Rather than inspecting
//! each returned value, a backend declares its [`ValueFormat`] once and the
//! interceptor picks the read path from it.

mod memory;
#[cfg(feature = "redis")]
mod redis;

pub use memory::{MemoryBackend, MemoryConfig};
#[cfg(feature = "redis")]
pub use self::redis::RedisBackend;

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::error::BackendError;

/// Result type for backend operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// How a backend returns stored values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueFormat {
    /// `get` returns the serialized text exactly as it was written.
    #[default]
    Serialized,
    /// `get_structured` returns decoded values.
    Structured,
}

/// Key-value store the explicit cache path reads and writes.
///
/// Implementations must be safe for concurrent use by many calls. Failures
/// are returned as-is; retry policy belongs to the store client.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name for logging/debugging.
    fn name(&self) -> &'static str;

    /// Format this backend returns values in.
    fn value_format(&self) -> ValueFormat {
        ValueFormat::Serialized
    }

    /// Fetch the serialized value stored at `key`.
    ///
    /// Returns `Ok(None)` on a miss.
    async fn get(&self, key: &str) -> BackendResult<Option<String>>;

    /// Fetch the decoded value stored at `key`.
    ///
    /// Only called when [`value_format`](Self::value_format) is
    /// [`ValueFormat::Structured`]. A stored value that cannot be decoded is
    /// reported as [`BackendError::Serialization`].
    async fn get_structured(&self, _key: &str) -> BackendResult<Option<Value>> {
        Err(BackendError::Unsupported("get_structured"))
    }

    /// Store `value` at `key` with no expiry.
    async fn set(&self, key: &str, value: &str) -> BackendResult<()>;

    /// Store `value` at `key`, expiring after `ttl`.
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> BackendResult<()>;
}
