//! Model-scoped client facade.
//!
//! [`CachedClient`] pairs an interceptor with an executor and exposes the
//! read operations per model, each accepting a `cache` directive in its
//! argument set:
//!
//! ```rust,ignore
//! let client = CachedClient::new(interceptor, executor);
//!
//! let user = client
//!     .model("User")
//!     .find_unique(args(json!({
//!         "where": {"id": 1},
//!         "cache": {"key": "user:1", "ttl": 60}
//!     })))
//!     .await?;
//! ```

use std::sync::Arc;

use serde_json::Value;

use crate::backend::CacheBackend;
use crate::dedup::DedupRegistry;
use crate::traits::QueryExecutor;
use crate::types::{CACHE_FIELD, Operation, QueryArgs, QueryCall};
use crate::{CacheInterceptor, QueryCacheError, Result};

/// An executor with every call routed through a [`CacheInterceptor`].
#[derive(Clone)]
pub struct CachedClient {
    interceptor: Arc<CacheInterceptor>,
    executor: Arc<dyn QueryExecutor>,
}

impl CachedClient {
    pub fn new(interceptor: Arc<CacheInterceptor>, executor: Arc<dyn QueryExecutor>) -> Self {
        Self {
            interceptor,
            executor,
        }
    }

    /// Operations scoped to one model.
    pub fn model(&self, name: impl Into<String>) -> ModelQuery<'_> {
        ModelQuery {
            client: self,
            model: name.into(),
        }
    }

    pub fn interceptor(&self) -> &Arc<CacheInterceptor> {
        &self.interceptor
    }

    /// Registry backing `cache: true` calls.
    pub fn dedup(&self) -> &Arc<DedupRegistry> {
        self.interceptor.dedup()
    }

    /// Store backing `cache: { key, ttl }` calls.
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        self.interceptor.backend()
    }
}

/// Operations on a single model. Created by [`CachedClient::model`].
pub struct ModelQuery<'a> {
    client: &'a CachedClient,
    model: String,
}

impl ModelQuery<'_> {
    pub fn name(&self) -> &str {
        &self.model
    }

    /// Run any operation. Writes and `aggregate` always pass through.
    ///
    /// Fails with [`QueryCacheError::MissingArguments`] when `operation`
    /// needs arguments and `args` holds nothing but a `cache` directive.
    pub async fn run(&self, operation: Operation, args: QueryArgs) -> Result<Value> {
        if operation.requires_args() && args.keys().all(|name| name == CACHE_FIELD) {
            return Err(QueryCacheError::MissingArguments {
                model: self.model.clone(),
                operation,
            });
        }
        let call = QueryCall::new(self.model.clone(), operation).args(args);
        self.client.interceptor.handle(call, &self.client.executor).await
    }

    pub async fn find_unique(&self, args: QueryArgs) -> Result<Value> {
        self.run(Operation::FindUnique, args).await
    }

    pub async fn find_unique_or_throw(&self, args: QueryArgs) -> Result<Value> {
        self.run(Operation::FindUniqueOrThrow, args).await
    }

    pub async fn group_by(&self, args: QueryArgs) -> Result<Value> {
        self.run(Operation::GroupBy, args).await
    }

    pub async fn find_many(&self, args: Option<QueryArgs>) -> Result<Value> {
        self.run(Operation::FindMany, args.unwrap_or_default()).await
    }

    pub async fn find_first(&self, args: Option<QueryArgs>) -> Result<Value> {
        self.run(Operation::FindFirst, args.unwrap_or_default()).await
    }

    pub async fn find_first_or_throw(&self, args: Option<QueryArgs>) -> Result<Value> {
        self.run(Operation::FindFirstOrThrow, args.unwrap_or_default()).await
    }

    pub async fn count(&self, args: Option<QueryArgs>) -> Result<Value> {
        self.run(Operation::Count, args.unwrap_or_default()).await
    }
}
