//! Canonical dedup identity of a call.

use serde_json::Value;

use crate::types::{Operation, QueryArgs};

/// Compute the dedup key for an operation and its clean arguments.
///
/// Object keys are sorted recursively, so argument maps that are equal as
/// JSON structures produce the same key regardless of insertion order.
/// Array order is significant.
pub fn dedup_key(operation: Operation, args: &QueryArgs) -> String {
    let mut out = String::with_capacity(64);
    out.push_str(operation.as_str());
    out.push(':');
    write_object(args, &mut out);
    out
}

fn write_object(map: &serde_json::Map<String, Value>, out: &mut String) {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

    out.push('{');
    for (i, (name, value)) in entries.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_string(name, out);
        out.push(':');
        write_value(value, out);
    }
    out.push('}');
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::String(s) => write_string(s, out),
        // null, bools and numbers have a single JSON spelling
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_string(s: &str, out: &mut String) {
    out.push_str(&Value::String(s.to_string()).to_string());
}
