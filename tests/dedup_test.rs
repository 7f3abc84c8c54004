//! Tests for auto caching (`cache: true`) and the dedup registry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::{Value, json};

use querycache::dedup::{DedupRegistry, DedupRequest, QueryFuture, QueryResult};
use querycache::{
    CACHE_FIELD, CacheInterceptor, Operation, OperationError, QueryArgs, QueryCacheError,
    QueryCall, QueryExecutor,
};
use querycache::backend::MemoryConfig;

// ============================================================================
// Mock executor
// ============================================================================

/// Executor that sleeps before answering, so concurrent callers overlap.
struct SlowExecutor {
    delay: Duration,
    fail_first: bool,
    calls: AtomicU32,
    running: AtomicU32,
    max_running: AtomicU32,
    seen: Mutex<Vec<(Operation, QueryArgs)>>,
}

impl SlowExecutor {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_first: false,
            calls: AtomicU32::new(0),
            running: AtomicU32::new(0),
            max_running: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn failing_first(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fail_first: true,
            calls: AtomicU32::new(0),
            running: AtomicU32::new(0),
            max_running: AtomicU32::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueryExecutor for SlowExecutor {
    async fn execute(
        &self,
        model: &str,
        operation: Operation,
        args: QueryArgs,
    ) -> std::result::Result<Value, OperationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        self.seen.lock().unwrap().push((operation, args.clone()));

        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);

        if self.fail_first && call == 1 {
            return Err(OperationError::new("deadlock detected"));
        }
        Ok(json!({"model": model, "call": call, "args": Value::Object(args)}))
    }
}

fn interceptor() -> Arc<CacheInterceptor> {
    Arc::new(
        CacheInterceptor::builder()
            .memory_backend(MemoryConfig::default())
            .build()
            .unwrap(),
    )
}

fn auto_call(model: &str, operation: Operation, filter: Value) -> QueryCall {
    QueryCall::new(model, operation)
        .arg("where", filter)
        .cache(true)
}

// ============================================================================
// Coalescing
// ============================================================================

#[tokio::test]
async fn concurrent_equal_calls_share_one_execution() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let calls = (0..8).map(|_| {
        let call = auto_call("User", Operation::FindMany, json!({"active": true}));
        let interceptor = Arc::clone(&interceptor);
        let executor = Arc::clone(&dyn_executor);
        async move { interceptor.handle(call, &executor).await }
    });
    let results = join_all(calls).await;

    assert_eq!(executor.calls(), 1);
    let first = results[0].as_ref().unwrap();
    for result in &results {
        assert_eq!(result.as_ref().unwrap(), first);
    }
    assert_eq!(interceptor.dedup().in_flight("User"), 0);
}

#[tokio::test]
async fn argument_key_order_does_not_split_calls() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let a = QueryCall::new("User", Operation::FindMany)
        .arg("where", json!({"active": true}))
        .arg("take", json!(10))
        .cache(true);
    let b = QueryCall::new("User", Operation::FindMany)
        .arg("take", json!(10))
        .arg("where", json!({"active": true}))
        .cache(true);

    let (ra, rb) = tokio::join!(
        interceptor.handle(a, &dyn_executor),
        interceptor.handle(b, &dyn_executor)
    );

    assert_eq!(ra.unwrap(), rb.unwrap());
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn different_arguments_run_concurrently() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let (active, inactive) = tokio::join!(
        interceptor.handle(
            auto_call("User", Operation::FindMany, json!({"active": true})),
            &dyn_executor
        ),
        interceptor.handle(
            auto_call("User", Operation::FindMany, json!({"active": false})),
            &dyn_executor
        )
    );

    assert_ne!(active.unwrap(), inactive.unwrap());
    assert_eq!(executor.calls(), 2);
    assert_eq!(executor.max_running.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn different_operations_do_not_collide() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let (many, count) = tokio::join!(
        interceptor.handle(
            auto_call("User", Operation::FindMany, json!({})),
            &dyn_executor
        ),
        interceptor.handle(auto_call("User", Operation::Count, json!({})), &dyn_executor)
    );

    many.unwrap();
    count.unwrap();
    assert_eq!(executor.calls(), 2);
}

#[tokio::test]
async fn different_models_do_not_collide() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let (user, post) = tokio::join!(
        interceptor.handle(
            auto_call("User", Operation::FindFirst, json!({"id": 1})),
            &dyn_executor
        ),
        interceptor.handle(
            auto_call("Post", Operation::FindFirst, json!({"id": 1})),
            &dyn_executor
        )
    );

    assert_eq!(user.unwrap()["model"], "User");
    assert_eq!(post.unwrap()["model"], "Post");
    assert_eq!(executor.calls(), 2);

    let mut resources = interceptor.dedup().resources();
    resources.sort();
    assert_eq!(resources, vec!["Post".to_string(), "User".to_string()]);
}

#[tokio::test]
async fn sequential_calls_recompute() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(1));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    for expected in 1..=3 {
        let result = interceptor
            .handle(
                auto_call("User", Operation::Count, json!({"active": true})),
                &dyn_executor,
            )
            .await
            .unwrap();
        assert_eq!(result["call"], expected);
    }
    assert_eq!(executor.calls(), 3);
}

#[tokio::test]
async fn auto_cache_strips_directive_and_skips_backend() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(1));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    interceptor
        .handle(
            auto_call("User", Operation::FindMany, json!({"id": 1})),
            &dyn_executor,
        )
        .await
        .unwrap();

    let seen = executor.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert!(!seen[0].1.contains_key(CACHE_FIELD));
    assert!(interceptor.backend().get("User").await.unwrap().is_none());
}

// ============================================================================
// Failure
// ============================================================================

#[tokio::test]
async fn failure_is_shared_with_joined_callers() {
    let interceptor = interceptor();
    let executor = SlowExecutor::failing_first(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let calls = (0..4).map(|_| {
        let call = auto_call("User", Operation::FindMany, json!({}));
        let interceptor = Arc::clone(&interceptor);
        let executor = Arc::clone(&dyn_executor);
        async move { interceptor.handle(call, &executor).await }
    });
    let results = join_all(calls).await;

    assert_eq!(executor.calls(), 1);
    for result in results {
        match result.unwrap_err() {
            QueryCacheError::Operation { source, .. } => {
                assert_eq!(source.message, "deadlock detected");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

#[tokio::test]
async fn failure_does_not_poison_later_calls() {
    let interceptor = interceptor();
    let executor = SlowExecutor::failing_first(Duration::from_millis(1));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let first = interceptor
        .handle(auto_call("User", Operation::FindMany, json!({})), &dyn_executor)
        .await;
    assert!(first.is_err());

    let second = interceptor
        .handle(auto_call("User", Operation::FindMany, json!({})), &dyn_executor)
        .await
        .unwrap();
    assert_eq!(second["call"], 2);
}

async fn exhausted_pool() -> QueryResult {
    tokio::time::sleep(Duration::from_millis(20)).await;
    panic!("connection pool exhausted")
}

fn registry_with_user_handler() -> DedupRegistry {
    let registry = DedupRegistry::new();
    registry.register_if_absent("User", Arc::new(|request: DedupRequest| request.run()));
    registry
}

fn request(query: fn() -> QueryFuture) -> DedupRequest {
    let mut args = QueryArgs::new();
    args.insert("where".into(), json!({"id": 1}));
    DedupRequest::new(Operation::FindMany, args, Box::new(move |_: QueryArgs| query()))
}

#[tokio::test]
async fn panicking_query_fails_joined_callers() {
    let registry = registry_with_user_handler();

    let (leader, joined) = tokio::join!(
        registry.invoke("User", request(|| Box::pin(exhausted_pool()))),
        registry.invoke("User", request(|| Box::pin(async { Ok(json!("unused")) })))
    );

    for result in [leader, joined] {
        let err = result.unwrap_err();
        assert!(err.message.contains("connection pool exhausted"), "{err}");
    }
    assert_eq!(registry.in_flight("User"), 0);
}

#[tokio::test]
async fn panicking_query_does_not_poison_later_calls() {
    let registry = registry_with_user_handler();

    let first = registry
        .invoke("User", request(|| Box::pin(exhausted_pool())))
        .await;
    assert!(first.is_err());
    assert_eq!(registry.in_flight("User"), 0);

    let second = registry
        .invoke("User", request(|| Box::pin(async { Ok(json!("fresh")) })))
        .await
        .unwrap();
    assert_eq!(second, json!("fresh"));
}

#[tokio::test]
async fn cancelled_caller_releases_in_flight_entry() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let call = auto_call("User", Operation::FindMany, json!({"id": 1}));
    let timed_out = tokio::time::timeout(
        Duration::from_millis(5),
        interceptor.handle(call, &dyn_executor),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(interceptor.dedup().in_flight("User"), 0);

    let result = interceptor
        .handle(auto_call("User", Operation::FindMany, json!({"id": 1})), &dyn_executor)
        .await
        .unwrap();
    assert_eq!(result["call"], 2);
    assert_eq!(interceptor.dedup().in_flight("User"), 0);
}

#[tokio::test]
async fn joined_caller_outlives_cancelled_leader() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let (leader, joined) = tokio::join!(
        tokio::time::timeout(
            Duration::from_millis(5),
            interceptor.handle(
                auto_call("User", Operation::Count, json!({})),
                &dyn_executor
            ),
        ),
        interceptor.handle(auto_call("User", Operation::Count, json!({})), &dyn_executor)
    );

    assert!(leader.is_err());
    assert_eq!(joined.unwrap()["call"], 1);
    assert_eq!(executor.calls(), 1);
    assert_eq!(interceptor.dedup().in_flight("User"), 0);
}

// ============================================================================
// Registry
// ============================================================================

#[tokio::test]
async fn spawned_callers_share_one_execution() {
    let interceptor = interceptor();
    let executor = SlowExecutor::new(Duration::from_millis(200));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let interceptor = Arc::clone(&interceptor);
            let executor = Arc::clone(&dyn_executor);
            tokio::spawn(async move {
                interceptor
                    .handle(auto_call("User", Operation::Count, json!({})), &executor)
                    .await
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap()["call"], 1);
    }
    assert_eq!(executor.calls(), 1);
}

#[tokio::test]
async fn first_registered_handler_wins() {
    let registry = DedupRegistry::new();
    assert!(registry.register_if_absent(
        "User",
        Arc::new(|request: DedupRequest| request.run())
    ));
    assert!(!registry.register_if_absent(
        "User",
        Arc::new(|_request: DedupRequest| -> QueryFuture {
            Box::pin(async { Ok(json!("replaced")) })
        })
    ));

    let query = Box::new(|_args: QueryArgs| -> QueryFuture {
        Box::pin(async { Ok(json!("original")) })
    });
    let result = registry
        .invoke(
            "User",
            DedupRequest::new(Operation::FindFirst, QueryArgs::new(), query),
        )
        .await
        .unwrap();
    assert_eq!(result, json!("original"));
}

#[tokio::test]
async fn shared_registry_coalesces_across_interceptors() {
    let registry = Arc::new(DedupRegistry::new());
    let build = || {
        CacheInterceptor::builder()
            .memory_backend(MemoryConfig::default())
            .dedup_registry(Arc::clone(&registry))
            .build()
            .unwrap()
    };
    let (a, b) = (build(), build());
    let executor = SlowExecutor::new(Duration::from_millis(50));
    let dyn_executor: Arc<dyn QueryExecutor> = executor.clone();

    let (ra, rb) = tokio::join!(
        a.handle(auto_call("User", Operation::FindMany, json!({})), &dyn_executor),
        b.handle(auto_call("User", Operation::FindMany, json!({})), &dyn_executor)
    );

    assert_eq!(ra.unwrap(), rb.unwrap());
    assert_eq!(executor.calls(), 1);
}
