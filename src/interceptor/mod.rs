//! The cache interceptor: classify each call and dispatch it.
//!
//! # Flow
//!
//! ```text
//!  QueryCall ──► classify ──┬─ PassThrough ───► query(clean args)
//!                           │
//!                           ├─ AutoCache ─────► DedupRegistry (register if absent)
//!                           │                       └─► one query per equal in-flight call
//!                           │
//!                           └─ ExplicitCache ─► backend GET key
//!                                                ├─ hit  ──► decoded value
//!                                                └─ miss ──► query(clean args)
//!                                                            ──► encode ──► SET / SETEX
//! ```
//!
//! The `cache` field is stripped from the arguments before any branch runs
//! the query, so the data layer never sees it. A rejected directive fails
//! the call before the backend or the query is touched.
//!
//! # Failure handling
//!
//! - Query failures are returned as-is and never written to the backend.
//! - GET failures fail the call ([`ReadFailurePolicy::FailClosed`], the
//!   default) or are logged and treated as a miss (`FailOpen`).
//! - A cached value that does not decode is logged, counted and treated as
//!   a miss; the fresh result overwrites it.
//! - SET failures are logged and counted; the caller still gets the result.

mod builder;
pub mod classify;
pub mod codec;

pub use builder::InterceptorBuilder;
pub use classify::{CacheStrategy, classify};

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::backend::{BackendResult, CacheBackend, ValueFormat};
use crate::config::Config;
use crate::dedup::{ComputeFn, DedupRegistry, DedupRequest, QueryFn, QueryResult};
use crate::error::{BackendError, OperationError};
use crate::telemetry;
use crate::traits::QueryExecutor;
use crate::types::{CACHE_FIELD, Operation, QueryArgs, QueryCall, ReadFailurePolicy, WriteMode};
use crate::{QueryCacheError, Result};

/// Caching layer placed in front of a data-access engine.
///
/// Cheap to share behind an `Arc`; no lock is held across a call.
pub struct CacheInterceptor {
    backend: Arc<dyn CacheBackend>,
    dedup: Arc<DedupRegistry>,
    compute: ComputeFn,
    write_mode: WriteMode,
    read_failure: ReadFailurePolicy,
}

impl CacheInterceptor {
    /// Create a new builder for configuring the interceptor.
    pub fn builder() -> InterceptorBuilder {
        InterceptorBuilder::new()
    }

    /// Build an interceptor from a loaded [`Config`].
    pub async fn from_config(config: &Config) -> Result<Self> {
        InterceptorBuilder::from_config(config).await?.build()
    }

    pub(crate) fn new(
        backend: Arc<dyn CacheBackend>,
        dedup: Arc<DedupRegistry>,
        write_mode: WriteMode,
        read_failure: ReadFailurePolicy,
    ) -> Self {
        Self {
            backend,
            dedup,
            compute: Arc::new(|request: DedupRequest| request.run()),
            write_mode,
            read_failure,
        }
    }

    /// Backend used by explicit caching.
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Registry used by auto caching.
    pub fn dedup(&self) -> &Arc<DedupRegistry> {
        &self.dedup
    }

    pub fn write_mode(&self) -> WriteMode {
        self.write_mode
    }

    pub fn read_failure(&self) -> ReadFailurePolicy {
        self.read_failure
    }

    /// Run `call` through the executor, applying its `cache` directive.
    pub async fn handle(
        &self,
        call: QueryCall,
        executor: &Arc<dyn QueryExecutor>,
    ) -> Result<Value> {
        let executor = Arc::clone(executor);
        let model = call.model.clone();
        let operation = call.operation;
        self.intercept(call, move |args| async move {
            executor.execute(&model, operation, args).await
        })
        .await
    }

    /// Run `call`, invoking `query` with the clean arguments when the
    /// result is not served from cache.
    ///
    /// # Panics
    ///
    /// With [`WriteMode::Detached`], must be called within a tokio runtime.
    #[instrument(skip(self, call, query), fields(model = %call.model, operation = %call.operation))]
    pub async fn intercept<F, Fut>(&self, call: QueryCall, query: F) -> Result<Value>
    where
        F: FnOnce(QueryArgs) -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult> + Send + 'static,
    {
        let start = Instant::now();
        let QueryCall {
            model,
            operation,
            mut args,
        } = call;

        let strategy = match classify(operation, &args) {
            Ok(strategy) => strategy,
            Err(source) => {
                Self::record_query(&model, "invalid", start, false);
                return Err(QueryCacheError::InvalidDirective {
                    model,
                    operation,
                    source,
                });
            }
        };
        let label = strategy.label();
        args.remove(CACHE_FIELD);

        let result = match strategy {
            CacheStrategy::PassThrough => query(args)
                .await
                .map_err(|source| operation_error(&model, operation, source)),
            CacheStrategy::AutoCache => self.deduplicated(&model, operation, args, query).await,
            CacheStrategy::ExplicitCache { key, ttl } => {
                self.read_through(&model, operation, key, ttl, args, query).await
            }
        };

        Self::record_query(&model, label, start, result.is_ok());
        result
    }

    async fn deduplicated<F, Fut>(
        &self,
        model: &str,
        operation: Operation,
        args: QueryArgs,
        query: F,
    ) -> Result<Value>
    where
        F: FnOnce(QueryArgs) -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult> + Send + 'static,
    {
        self.dedup.register_if_absent(model, Arc::clone(&self.compute));

        let query: QueryFn = Box::new(move |args| query(args).boxed());
        self.dedup
            .invoke(model, DedupRequest::new(operation, args, query))
            .await
            .map_err(|source| operation_error(model, operation, source))
    }

    async fn read_through<F, Fut>(
        &self,
        model: &str,
        operation: Operation,
        key: String,
        ttl: Option<u64>,
        args: QueryArgs,
        query: F,
    ) -> Result<Value>
    where
        F: FnOnce(QueryArgs) -> Fut + Send + 'static,
        Fut: Future<Output = QueryResult> + Send + 'static,
    {
        if let Some(cached) = self.lookup(model, operation, &key).await? {
            debug!(key = %key, "Serving cached result");
            metrics::counter!(telemetry::CACHE_HITS_TOTAL, "model" => model.to_string())
                .increment(1);
            return Ok(cached);
        }
        debug!(key = %key, "Cache miss, running query");
        metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "model" => model.to_string())
            .increment(1);

        let result = query(args)
            .await
            .map_err(|source| operation_error(model, operation, source))?;

        self.store(model, key, &result, ttl).await;
        Ok(result)
    }

    /// GET `key`, decoding according to the backend's value format.
    async fn lookup(
        &self,
        model: &str,
        operation: Operation,
        key: &str,
    ) -> Result<Option<Value>> {
        let fetched = match self.backend.value_format() {
            ValueFormat::Serialized => self
                .backend
                .get(key)
                .await
                .and_then(|raw| raw.map(|raw| codec::decode(&raw)).transpose()),
            ValueFormat::Structured => self.backend.get_structured(key).await,
        };

        match fetched {
            Ok(value) => Ok(value),
            Err(BackendError::Serialization(reason)) => {
                warn!(key, reason = %reason, "Cached value is corrupt, recomputing");
                metrics::counter!(
                    telemetry::CACHE_DECODE_FAILURES_TOTAL,
                    "model" => model.to_string()
                )
                .increment(1);
                Ok(None)
            }
            Err(source) => match self.read_failure {
                ReadFailurePolicy::FailClosed => Err(QueryCacheError::Backend {
                    model: model.to_string(),
                    operation,
                    key: key.to_string(),
                    source,
                }),
                ReadFailurePolicy::FailOpen => {
                    warn!(
                        key,
                        backend = self.backend.name(),
                        error = %source,
                        "Cache read failed, computing uncached"
                    );
                    Ok(None)
                }
            },
        }
    }

    /// Encode and write a fresh result. Failures are logged, never returned.
    async fn store(&self, model: &str, key: String, result: &Value, ttl: Option<u64>) {
        let encoded = match codec::encode(result) {
            Ok(encoded) => encoded,
            Err(e) => {
                write_failed(model, &key, &e);
                return;
            }
        };

        match self.write_mode {
            WriteMode::Awaited => {
                if let Err(e) = write(self.backend.as_ref(), &key, &encoded, ttl).await {
                    write_failed(model, &key, &e);
                }
            }
            WriteMode::Detached => {
                let backend = Arc::clone(&self.backend);
                let model = model.to_string();
                tokio::spawn(async move {
                    if let Err(e) = write(backend.as_ref(), &key, &encoded, ttl).await {
                        write_failed(&model, &key, &e);
                    }
                });
            }
        }
    }

    fn record_query(model: &str, strategy: &'static str, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::QUERIES_TOTAL,
            "model" => model.to_string(), "strategy" => strategy, "status" => status)
        .increment(1);
        metrics::histogram!(telemetry::QUERY_DURATION_SECONDS,
            "model" => model.to_string(), "strategy" => strategy)
        .record(start.elapsed().as_secs_f64());
    }
}

impl std::fmt::Debug for CacheInterceptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInterceptor")
            .field("backend", &self.backend.name())
            .field("dedup", &self.dedup)
            .field("write_mode", &self.write_mode)
            .field("read_failure", &self.read_failure)
            .finish()
    }
}

async fn write(
    backend: &dyn CacheBackend,
    key: &str,
    value: &str,
    ttl: Option<u64>,
) -> BackendResult<()> {
    match ttl {
        Some(secs) => {
            backend
                .set_with_ttl(key, value, Duration::from_secs(secs))
                .await
        }
        None => backend.set(key, value).await,
    }
}

fn write_failed(model: &str, key: &str, error: &BackendError) {
    warn!(model, key, error = %error, "Cache write failed, returning computed result");
    metrics::counter!(telemetry::CACHE_WRITE_FAILURES_TOTAL, "model" => model.to_string())
        .increment(1);
}

fn operation_error(model: &str, operation: Operation, source: OperationError) -> QueryCacheError {
    QueryCacheError::Operation {
        model: model.to_string(),
        operation,
        source,
    }
}
