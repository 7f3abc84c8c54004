//! Tests for the model-scoped [`CachedClient`] facade.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use querycache::backend::MemoryConfig;
use querycache::{
    CACHE_FIELD, CacheInterceptor, CachedClient, Operation, OperationError, QueryArgs,
    QueryExecutor,
};

/// Executor that echoes the call back and counts invocations.
#[derive(Default)]
struct EchoExecutor {
    calls: AtomicU32,
    log: Mutex<Vec<(String, Operation, QueryArgs)>>,
}

#[async_trait]
impl QueryExecutor for EchoExecutor {
    async fn execute(
        &self,
        model: &str,
        operation: Operation,
        args: QueryArgs,
    ) -> std::result::Result<Value, OperationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push((model.to_string(), operation, args.clone()));
        Ok(json!({
            "model": model,
            "operation": operation.as_str(),
            "args": Value::Object(args),
        }))
    }
}

fn args(value: Value) -> QueryArgs {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

fn client() -> (CachedClient, Arc<EchoExecutor>) {
    let executor = Arc::new(EchoExecutor::default());
    let interceptor = CacheInterceptor::builder()
        .memory_backend(MemoryConfig::default())
        .build()
        .unwrap();
    let client = CachedClient::new(Arc::new(interceptor), executor.clone());
    (client, executor)
}

#[tokio::test]
async fn model_operations_route_to_executor() {
    let (client, executor) = client();
    let users = client.model("User");
    assert_eq!(users.name(), "User");

    users.find_unique(args(json!({"where": {"id": 1}}))).await.unwrap();
    users.find_many(None).await.unwrap();
    users.count(Some(args(json!({"where": {"active": true}})))).await.unwrap();
    users.group_by(args(json!({"by": ["role"]}))).await.unwrap();

    let log = executor.log.lock().unwrap().clone();
    let operations: Vec<_> = log.iter().map(|(_, op, _)| *op).collect();
    assert_eq!(
        operations,
        vec![
            Operation::FindUnique,
            Operation::FindMany,
            Operation::Count,
            Operation::GroupBy
        ]
    );
    assert!(log.iter().all(|(model, _, _)| model == "User"));
    assert!(log[1].2.is_empty());
}

#[tokio::test]
async fn explicit_cache_through_client() {
    let (client, executor) = client();
    let request = json!({
        "where": {"id": 1},
        "cache": {"key": "user:1", "ttl": 60}
    });

    let first = client
        .model("User")
        .find_first(Some(args(request.clone())))
        .await
        .unwrap();
    let second = client
        .model("User")
        .find_first(Some(args(request)))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
    assert!(!first["args"].as_object().unwrap().contains_key(CACHE_FIELD));
    assert!(client.backend().get("user:1").await.unwrap().is_some());
}

#[tokio::test]
async fn throwing_variants_are_cacheable() {
    let (client, executor) = client();
    let request = args(json!({
        "where": {"email": "a@example.com"},
        "cache": {"key": "user:a"}
    }));

    let users = client.model("User");
    users.find_unique_or_throw(request.clone()).await.unwrap();
    users.find_unique_or_throw(request).await.unwrap();
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);

    let request = args(json!({"cache": {"key": "user:first"}}));
    users.find_first_or_throw(Some(request.clone())).await.unwrap();
    users.find_first_or_throw(Some(request)).await.unwrap();
    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn writes_through_run_always_execute() {
    let (client, executor) = client();
    let posts = client.model("Post");
    let request = args(json!({
        "data": {"title": "hello"},
        "cache": {"key": "post:new"}
    }));

    posts.run(Operation::Create, request.clone()).await.unwrap();
    posts.run(Operation::Create, request).await.unwrap();

    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    assert!(client.backend().get("post:new").await.unwrap().is_none());
}

#[tokio::test]
async fn auto_cache_registers_model_handler() {
    let (client, _executor) = client();
    assert!(client.dedup().is_empty());

    client
        .model("Comment")
        .find_many(Some(args(json!({"cache": true}))))
        .await
        .unwrap();

    assert!(client.dedup().is_registered("Comment"));
    assert!(Arc::ptr_eq(client.dedup(), client.interceptor().dedup()));
}

#[tokio::test]
async fn required_arguments_are_enforced() {
    let (client, executor) = client();
    let users = client.model("User");

    let err = users.find_unique(QueryArgs::new()).await.unwrap_err();
    assert!(matches!(
        err,
        querycache::QueryCacheError::MissingArguments {
            operation: Operation::FindUnique,
            ..
        }
    ));

    let err = users
        .group_by(args(json!({"cache": {"key": "users:roles"}})))
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "User.groupBy requires arguments");

    // optional-argument reads accept an empty set
    users.count(None).await.unwrap();
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
}
