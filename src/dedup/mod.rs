//! Per-resource single-flight registry for auto-cached calls.
//!
//! Each resource (model) name gets one [`ComputeFn`] handler, registered
//! lazily on first use and never removed. Invoking a handler joins any
//! computation already in flight for the same operation and structurally
//! equal arguments; otherwise it starts a new one.
//!
//! ```text
//!   invoke("User", findMany {where: ..})  ──┐
//!   invoke("User", findMany {where: ..})  ──┼──► one computation ──► shared result
//!   invoke("User", findMany {where: ..})  ──┘
//!   invoke("User", count {where: ..})     ────► separate computation
//! ```
//!
//! Nothing outlives the in-flight window: once a computation settles its
//! entry is dropped, so the next call computes afresh. This is stampede
//! protection, not a long-lived cache.
//!
//! A computation that panics settles as an [`OperationError`] for every
//! caller that joined it. A computation whose callers all went away is
//! dropped along with its entry.

mod key;

pub use key::dedup_key;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::OperationError;
use crate::telemetry;
use crate::types::{Operation, QueryArgs};

/// Outcome of one underlying computation.
pub type QueryResult = std::result::Result<Value, OperationError>;

/// Boxed future produced by a query closure.
pub type QueryFuture = BoxFuture<'static, QueryResult>;

/// The underlying query, invoked with clean arguments.
pub type QueryFn = Box<dyn FnOnce(QueryArgs) -> QueryFuture + Send>;

/// Handler registered for a resource name.
pub type ComputeFn = Arc<dyn Fn(DedupRequest) -> QueryFuture + Send + Sync>;

/// One auto-cached invocation.
///
/// `operation` and `args` form the dedup identity; `query` runs the call
/// when no equal computation is in flight.
pub struct DedupRequest {
    pub operation: Operation,
    pub args: QueryArgs,
    pub query: QueryFn,
}

impl DedupRequest {
    pub fn new(operation: Operation, args: QueryArgs, query: QueryFn) -> Self {
        Self {
            operation,
            args,
            query,
        }
    }

    /// Run the query with this request's arguments.
    pub fn run(self) -> QueryFuture {
        (self.query)(self.args)
    }
}

impl std::fmt::Debug for DedupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupRequest")
            .field("operation", &self.operation)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}

/// One in-flight computation. The map holds it weakly: when every caller
/// has gone away the computation is dropped with them.
struct InFlight {
    id: u64,
    future: WeakShared<QueryFuture>,
}

type InFlightMap = DashMap<String, InFlight>;

/// Removes an in-flight entry when its computation settles or is dropped.
///
/// Only the entry with a matching `id` is removed, so a computation started
/// after this one was abandoned keeps its slot.
struct Settle {
    in_flight: Arc<InFlightMap>,
    key: String,
    id: u64,
}

impl Drop for Settle {
    fn drop(&mut self) {
        self.in_flight.remove_if(&self.key, |_, entry| entry.id == self.id);
    }
}

struct DedupHandler {
    compute: ComputeFn,
    in_flight: Arc<InFlightMap>,
    next_id: AtomicU64,
}

impl DedupHandler {
    fn new(compute: ComputeFn) -> Self {
        Self {
            compute,
            in_flight: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    async fn run(&self, resource: &str, request: DedupRequest) -> QueryResult {
        let key = dedup_key(request.operation, &request.args);

        let future = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(mut entry) => match entry.get().future.upgrade() {
                Some(future) => {
                    debug!(
                        resource,
                        operation = %request.operation,
                        "Joining in-flight computation"
                    );
                    metrics::counter!(
                        telemetry::DEDUP_JOINED_TOTAL,
                        "model" => resource.to_string()
                    )
                    .increment(1);
                    future
                }
                None => {
                    let (slot, future) = self.start(resource, key, request);
                    match slot {
                        Some(slot) => {
                            entry.insert(slot);
                        }
                        None => {
                            entry.remove();
                        }
                    }
                    future
                }
            },
            Entry::Vacant(entry) => {
                let (slot, future) = self.start(resource, key, request);
                if let Some(slot) = slot {
                    entry.insert(slot);
                }
                future
            }
        };

        future.await
    }

    /// Build the shared computation for `request` and its map slot.
    fn start(
        &self,
        resource: &str,
        key: String,
        request: DedupRequest,
    ) -> (Option<InFlight>, Shared<QueryFuture>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let settle = Settle {
            in_flight: Arc::clone(&self.in_flight),
            key,
            id,
        };
        let resource = resource.to_string();
        let computation = AssertUnwindSafe((self.compute)(request)).catch_unwind();

        let future = async move {
            let _settle = settle;
            computation
                .await
                .unwrap_or_else(|payload| Err(panicked(&resource, payload)))
        }
        .boxed()
        .shared();

        let slot = future.downgrade().map(|weak| InFlight { id, future: weak });
        (slot, future)
    }
}

/// Turn a panicking query into an error shared by every joined caller.
fn panicked(resource: &str, payload: Box<dyn Any + Send>) -> OperationError {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown cause".to_string());
    warn!(resource, panic = %detail, "Deduplicated query panicked");
    OperationError::new(format!("query panicked: {detail}"))
}

/// Registry of per-resource dedup handlers.
///
/// Lookups and invocations for different resources never block each
/// other; only equal in-flight calls on one resource are coalesced.
#[derive(Default)]
pub struct DedupRegistry {
    handlers: DashMap<String, Arc<DedupHandler>>,
}

impl DedupRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `compute` for `resource` unless a handler already exists.
    ///
    /// Returns `true` when the handler was newly installed.
    pub fn register_if_absent(&self, resource: &str, compute: ComputeFn) -> bool {
        if self.handlers.contains_key(resource) {
            return false;
        }
        match self.handlers.entry(resource.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(DedupHandler::new(compute)));
                debug!(resource, "Registered dedup handler");
                true
            }
        }
    }

    /// Whether a handler exists for `resource`.
    pub fn is_registered(&self, resource: &str) -> bool {
        self.handlers.contains_key(resource)
    }

    /// Number of registered resources.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Names of all registered resources.
    pub fn resources(&self) -> Vec<String> {
        self.handlers.iter().map(|h| h.key().clone()).collect()
    }

    /// Number of computations currently in flight for `resource`.
    pub fn in_flight(&self, resource: &str) -> usize {
        self.handlers
            .get(resource)
            .map(|handler| handler.in_flight.len())
            .unwrap_or(0)
    }

    /// Run `request` through the handler for `resource`, sharing the
    /// result with every concurrent caller that passes an equal request.
    ///
    /// # Panics
    ///
    /// Panics if no handler is registered for `resource`. Callers register
    /// with [`register_if_absent`](Self::register_if_absent) first.
    pub async fn invoke(&self, resource: &str, request: DedupRequest) -> QueryResult {
        let handler = self
            .handlers
            .get(resource)
            .map(|handler| Arc::clone(handler.value()));
        let Some(handler) = handler else {
            panic!("no dedup handler registered for resource '{resource}'");
        };
        handler.run(resource, request).await
    }
}

impl std::fmt::Debug for DedupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DedupRegistry")
            .field("resources", &self.resources())
            .finish()
    }
}
