//! Canonical byte encoding for signing.
//!
//! A value is converted to a JSON tree whose objects are key-sorted maps and
//! then written compactly. Two structurally equal values therefore encode to
//! identical bytes no matter how they were constructed.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::CanonicalError;

/// Canonical JSON bytes of `value`, keys sorted at every level.
pub fn canonical_json<T: Serialize>(value: &T) -> Result<Vec<u8>, CanonicalError> {
    let tree = serde_json::to_value(value).map_err(|e| CanonicalError(e.to_string()))?;
    serde_json::to_vec(&sort_keys(tree)).map_err(|e| CanonicalError(e.to_string()))
}

// serde_json's default map is already ordered, but the `preserve_order`
// feature can be switched on by any crate in the graph.
fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (key, val) in entries {
                sorted.insert(key, sort_keys(val));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}
