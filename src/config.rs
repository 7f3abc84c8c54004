//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (if provided)
//! 2. `~/.querycache/config.toml` (user)
//! 3. `/etc/querycache/config.toml` (system)
//!
//! ```toml
//! [backend]
//! kind = "redis"            # or "memory" (default)
//!
//! [backend.memory]
//! max_entries = 10000
//! value_format = "serialized"
//!
//! [backend.redis]
//! url = "redis://localhost:6379/0"
//!
//! [interceptor]
//! write_mode = "awaited"    # or "detached"
//! read_failure = "fail_closed"  # or "fail_open"
//! ```

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::backend::{MemoryConfig, ValueFormat};
use crate::types::{ReadFailurePolicy, WriteMode};
use crate::{QueryCacheError, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub interceptor: InterceptorConfig,
}

/// Which store backs explicit caching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Memory,
    Redis,
}

/// Backend selection and per-backend settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default)]
    pub memory: MemorySection,
    #[serde(default)]
    pub redis: RedisSection,
}

/// In-process backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MemorySection {
    /// Maximum cached entries (default: 10000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
    #[serde(default)]
    pub value_format: ValueFormat,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            value_format: ValueFormat::default(),
        }
    }
}

impl MemorySection {
    pub fn to_memory_config(&self) -> MemoryConfig {
        MemoryConfig::new()
            .max_entries(self.max_entries)
            .value_format(self.value_format)
    }
}

fn default_max_entries() -> u64 {
    10_000
}

/// Redis backend settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSection {
    /// Connection URL (default: redis://127.0.0.1:6379).
    #[serde(default = "default_redis_url")]
    pub url: String,
}

impl Default for RedisSection {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

/// Interceptor behaviour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InterceptorConfig {
    #[serde(default)]
    pub write_mode: WriteMode,
    #[serde(default)]
    pub read_failure: ReadFailurePolicy,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.querycache/config.toml`
    /// 3. `/etc/querycache/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            QueryCacheError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::parse(&content).map_err(|e| match e {
            QueryCacheError::Configuration(msg) => {
                QueryCacheError::Configuration(format!("{msg} (in {path:?})"))
            }
            other => other,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            QueryCacheError::Configuration(format!("Failed to parse config: {e}"))
        })
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(QueryCacheError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".querycache").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/querycache/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(QueryCacheError::Configuration(
            "No config file found. Create ~/.querycache/config.toml or /etc/querycache/config.toml"
                .to_string(),
        ))
    }
}
