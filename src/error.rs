//! querycache error types
//!
//! Every error is `Clone`: a failed deduplicated computation is handed to
//! each caller that joined it.

use crate::types::Operation;

/// Top-level error returned by an intercepted call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueryCacheError {
    /// The `cache` directive was malformed. Raised before any backend or
    /// executor interaction.
    #[error("invalid cache directive for {model}.{operation}: {source}")]
    InvalidDirective {
        model: String,
        operation: Operation,
        source: DirectiveError,
    },

    /// The underlying data operation failed. Never cached.
    #[error("{model}.{operation} failed: {source}")]
    Operation {
        model: String,
        operation: Operation,
        source: OperationError,
    },

    /// A GET against the cache backend failed.
    #[error("cache backend error for {model}.{operation} at key '{key}': {source}")]
    Backend {
        model: String,
        operation: Operation,
        key: String,
        source: BackendError,
    },

    /// A read that needs an argument set was called without one.
    #[error("{model}.{operation} requires arguments")]
    MissingArguments { model: String, operation: Operation },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl QueryCacheError {
    /// Cache key involved in the failure, if any.
    pub fn cache_key(&self) -> Option<&str> {
        match self {
            QueryCacheError::Backend { key, .. } => Some(key),
            _ => None,
        }
    }

    /// Whether this is a rejected `cache` directive.
    pub fn is_invalid_directive(&self) -> bool {
        matches!(self, QueryCacheError::InvalidDirective { .. })
    }
}

/// Why an explicit cache descriptor was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectiveError {
    #[error("cache key is missing")]
    MissingKey,

    #[error("cache key must be a non-empty string")]
    InvalidKey,

    #[error("cache ttl must be a positive integer number of seconds, got {0}")]
    InvalidTtl(String),
}

/// Failure reported by the underlying data-access engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct OperationError {
    pub message: String,
}

impl OperationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for OperationError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for OperationError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Errors raised by a [`CacheBackend`](crate::backend::CacheBackend).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("connection error: {0}")]
    Connection(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("operation not supported by this backend: {0}")]
    Unsupported(&'static str),
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Serialization(err.to_string())
    }
}

/// Result type alias for querycache operations
pub type Result<T> = std::result::Result<T, QueryCacheError>;
