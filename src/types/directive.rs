//! The per-call `cache` directive and the call it rides on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Operation;

/// Name of the reserved argument field carrying the caching directive.
pub const CACHE_FIELD: &str = "cache";

/// Argument set of one call: parameter name to value.
pub type QueryArgs = Map<String, Value>;

/// Typed form of the `cache` directive.
///
/// Serializes untagged, so `CacheArg::Enabled(true)` is `true` and
/// `CacheArg::Options(..)` is `{"key": "...", "ttl": 60}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheArg {
    /// `true` deduplicates concurrent identical calls, `false` opts out.
    Enabled(bool),
    /// Explicit key/ttl caching against the backend.
    Options(CacheOptions),
}

impl From<bool> for CacheArg {
    fn from(enabled: bool) -> Self {
        CacheArg::Enabled(enabled)
    }
}

impl From<CacheOptions> for CacheArg {
    fn from(options: CacheOptions) -> Self {
        CacheArg::Options(options)
    }
}

/// Explicit cache descriptor.
///
/// ```rust
/// # use querycache::CacheOptions;
/// let options = CacheOptions::new("user:1").ttl(60);
/// assert_eq!(options.ttl, Some(60));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheOptions {
    /// Backend key the result is stored under.
    pub key: String,
    /// Time to live in seconds. `None` stores without expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
}

impl CacheOptions {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ttl: None,
        }
    }

    /// Set the time to live in seconds.
    pub fn ttl(mut self, secs: u64) -> Self {
        self.ttl = Some(secs);
        self
    }
}

/// One intercepted call: the model it targets, the operation and its
/// arguments (directive included).
#[derive(Debug, Clone, PartialEq)]
pub struct QueryCall {
    pub model: String,
    pub operation: Operation,
    pub args: QueryArgs,
}

impl QueryCall {
    pub fn new(model: impl Into<String>, operation: Operation) -> Self {
        Self {
            model: model.into(),
            operation,
            args: QueryArgs::new(),
        }
    }

    /// Replace the argument set.
    pub fn args(mut self, args: QueryArgs) -> Self {
        self.args = args;
        self
    }

    /// Set a single argument.
    pub fn arg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.args.insert(name.into(), value);
        self
    }

    /// Attach a `cache` directive.
    pub fn cache(mut self, directive: impl Into<CacheArg>) -> Self {
        let value = match directive.into() {
            CacheArg::Enabled(enabled) => Value::Bool(enabled),
            CacheArg::Options(options) => {
                let mut descriptor = Map::new();
                descriptor.insert("key".into(), Value::String(options.key));
                if let Some(ttl) = options.ttl {
                    descriptor.insert("ttl".into(), Value::from(ttl));
                }
                Value::Object(descriptor)
            }
        };
        self.args.insert(CACHE_FIELD.to_string(), value);
        self
    }
}
