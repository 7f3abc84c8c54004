//! querycache - caching interception layer for a data-access API
//!
//! Every call carries an optional `cache` directive in its argument set:
//!
//! - omitted or `false`: the call passes straight through;
//! - `true`: concurrent calls with equal arguments share one computation
//!   (stampede protection, nothing is stored);
//! - `{ "key": "...", "ttl": 60 }`: read-through caching against a
//!   key-value [`CacheBackend`](backend::CacheBackend), with optional expiry.
//!
//! The directive is stripped before the underlying [`QueryExecutor`] runs,
//! so the data layer never observes it.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use querycache::{CacheInterceptor, CacheOptions, Operation, QueryCall};
//! use querycache::backend::MemoryConfig;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> querycache::Result<()> {
//!     let interceptor = CacheInterceptor::builder()
//!         .memory_backend(MemoryConfig::default())
//!         .build()?;
//!
//!     let call = QueryCall::new("User", Operation::FindUnique)
//!         .arg("where", json!({"id": 1}))
//!         .cache(CacheOptions::new("user:1").ttl(60));
//!
//!     let user = interceptor
//!         .intercept(call, |args| async move {
//!             // the real data layer runs here, without the `cache` field
//!             assert!(!args.contains_key("cache"));
//!             Ok(json!({"id": 1, "name": "A"}))
//!         })
//!         .await?;
//!
//!     println!("{user}");
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod interceptor;
pub mod telemetry;
pub mod traits;
pub mod types;

// Re-export main types at crate root
pub use client::{CachedClient, ModelQuery};
pub use config::Config;
pub use dedup::DedupRegistry;
pub use error::{BackendError, DirectiveError, OperationError, QueryCacheError, Result};
pub use interceptor::{CacheInterceptor, CacheStrategy, InterceptorBuilder, classify};
pub use traits::QueryExecutor;

// Re-export all types
pub use types::{
    CACHE_FIELD, CacheArg, CacheOptions, Operation, QueryArgs, QueryCall, ReadFailurePolicy,
    WriteMode,
};
