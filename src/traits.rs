//! Core QueryExecutor trait

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OperationError;
use crate::types::{Operation, QueryArgs};

/// The data-access engine that actually runs queries.
///
/// The interceptor calls this with the `cache` directive already stripped
/// from `args`; implementations never see it.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    /// Run `operation` against `model` with the given arguments.
    async fn execute(
        &self,
        model: &str,
        operation: Operation,
        args: QueryArgs,
    ) -> std::result::Result<Value, OperationError>;
}
