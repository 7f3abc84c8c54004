//! Textual encoding of cached results.
//!
//! Results are stored as compact JSON. With serde_json's `float_roundtrip`
//! enabled, `decode(encode(v)) == v` for every JSON value.

use serde_json::Value;

use crate::error::BackendError;

/// Serialize a query result for storage.
pub fn encode(value: &Value) -> Result<String, BackendError> {
    Ok(serde_json::to_string(value)?)
}

/// Deserialize a stored result.
pub fn decode(raw: &str) -> Result<Value, BackendError> {
    Ok(serde_json::from_str(raw)?)
}
