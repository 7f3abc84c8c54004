//! Call classification: which caching strategy applies to a call.

use serde_json::{Map, Value};

use crate::error::DirectiveError;
use crate::types::{CACHE_FIELD, Operation, QueryArgs};

/// Caching strategy chosen for one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheStrategy {
    /// Run the operation directly; the backend is not touched.
    PassThrough,
    /// Share one in-flight computation among concurrent equal calls.
    AutoCache,
    /// Read-through against the backend at `key`.
    ExplicitCache { key: String, ttl: Option<u64> },
}

impl CacheStrategy {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            CacheStrategy::PassThrough => "passthrough",
            CacheStrategy::AutoCache => "auto",
            CacheStrategy::ExplicitCache { .. } => "explicit",
        }
    }
}

/// Decide how `operation` called with `args` is cached.
///
/// | `cache` field                     | strategy                     |
/// |-----------------------------------|------------------------------|
/// | absent, `null`, `false`           | `PassThrough`                |
/// | string, number, array             | `PassThrough`                |
/// | `true`                            | `AutoCache`                  |
/// | `{ key, ttl? }`                   | `ExplicitCache`              |
///
/// Operations outside the cacheable set always pass through, whatever the
/// directive looks like. Pure: no I/O, no mutation.
pub fn classify(
    operation: Operation,
    args: &QueryArgs,
) -> Result<CacheStrategy, DirectiveError> {
    if !operation.is_cacheable() {
        return Ok(CacheStrategy::PassThrough);
    }

    match args.get(CACHE_FIELD) {
        Some(Value::Bool(true)) => Ok(CacheStrategy::AutoCache),
        Some(Value::Object(descriptor)) => explicit(descriptor),
        _ => Ok(CacheStrategy::PassThrough),
    }
}

fn explicit(descriptor: &Map<String, Value>) -> Result<CacheStrategy, DirectiveError> {
    let key = match descriptor.get("key") {
        None | Some(Value::Null) => return Err(DirectiveError::MissingKey),
        Some(Value::String(key)) if !key.is_empty() => key.clone(),
        Some(_) => return Err(DirectiveError::InvalidKey),
    };

    let ttl = match descriptor.get("ttl") {
        None | Some(Value::Null) => None,
        Some(Value::Number(n)) => match n.as_u64() {
            Some(secs) if secs > 0 => Some(secs),
            _ => return Err(DirectiveError::InvalidTtl(n.to_string())),
        },
        Some(other) => return Err(DirectiveError::InvalidTtl(other.to_string())),
    };

    Ok(CacheStrategy::ExplicitCache { key, ttl })
}
