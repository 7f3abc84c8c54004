//! Cache write and read-failure policy types.

use serde::{Deserialize, Serialize};

/// Whether a cache write finishes before the computed result is returned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Await the SET/SETEX before returning.
    ///
    /// A later GET for the same key observes the new value as soon as the
    /// call returns. This is the default.
    #[default]
    Awaited,

    /// Spawn the write on the runtime and return immediately.
    ///
    /// Lower latency; a GET issued right after the call may still miss.
    Detached,
}

/// What to do when a GET against the backend fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadFailurePolicy {
    /// Surface the backend error to the caller. This is the default.
    #[default]
    FailClosed,

    /// Log a warning and compute as if the key were absent.
    FailOpen,
}
