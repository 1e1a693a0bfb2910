//! Deterministic structural size estimation
//!
//! Exact object size is not portable, so cached items are charged by a
//! structural walk over their serialized form: strings and byte buffers
//! by length, maps and sequences by summing their parts, plus a fixed
//! per-node overhead. Approximate, but consistent across calls for the
//! same value.

use serde::Serialize;
use serde_json::Value;

/// Fixed overhead charged per structural node.
const NODE_OVERHEAD: usize = 16;
/// Charge for scalar values (numbers, booleans, null).
const SCALAR_SIZE: usize = 8;
/// Charge for values that cannot be serialized at all.
const UNKNOWN_SIZE: usize = 256;

/// Estimate the in-memory footprint of a serializable value in bytes.
pub fn estimate_size<T: Serialize>(value: &T) -> usize {
    match serde_json::to_value(value) {
        Ok(v) => walk(&v),
        Err(_) => UNKNOWN_SIZE,
    }
}

fn walk(value: &Value) -> usize {
    NODE_OVERHEAD
        + match value {
            Value::Null | Value::Bool(_) | Value::Number(_) => SCALAR_SIZE,
            Value::String(s) => s.len(),
            Value::Array(items) => items.iter().map(walk).sum(),
            Value::Object(map) => map.iter().map(|(k, v)| k.len() + walk(v)).sum(),
        }
}
