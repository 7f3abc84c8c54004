//! Public types for the querycache API.

mod directive;
mod operation;
mod policy;

pub use directive::{CACHE_FIELD, CacheArg, CacheOptions, QueryArgs, QueryCall};
pub use operation::Operation;
pub use policy::{ReadFailurePolicy, WriteMode};
