//! Canonical JSON encoding.
//!
//! The single most portability-critical piece of this crate: lockfiles,
//! package descriptors and certificate TBS bytes all funnel through
//! `canonical_json` so that two independent implementations produce
//! byte-identical output for structurally equal values.
//!
//! Rules: object keys sorted lexicographically at every depth; arrays keep
//! their given order; no insignificant whitespace; numbers and strings use
//! `serde_json`'s own (already shortest-round-trip / minimally-escaped)
//! rendering.

use serde_json::Value;
use std::collections::BTreeMap;

/// Serialize `value` into its canonical byte form.
pub fn canonical_json(value: &Value) -> Vec<u8> {
    let sorted = sort_keys(value);
    // `serde_json::to_vec` never adds insignificant whitespace.
    serde_json::to_vec(&sorted).expect("canonical value is always serializable")
}

/// Serialize any `Serialize` value into canonical bytes by round-tripping
/// it through `serde_json::Value` first.
pub fn canonical_json_of<T: serde::Serialize>(value: &T) -> Vec<u8> {
    let v = serde_json::to_value(value).expect("value must serialize to JSON");
    canonical_json(&v)
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.iter().map(|(k, v)| (k.clone(), sort_keys(v))).collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_object_keys_at_every_depth() {
        let v = json!({"b": 1, "a": {"d": 2, "c": 3}});
        let out = canonical_json(&v);
        assert_eq!(out, br#"{"a":{"c":3,"d":2},"b":1}"#);
    }

    #[test]
    fn preserves_array_order() {
        let v = json!({"a": [3, 1, 2]});
        let out = canonical_json(&v);
        assert_eq!(out, br#"{"a":[3,1,2]}"#);
    }

    #[test]
    fn is_idempotent() {
        let v = json!({"z": 1, "y": [1, {"b": 2, "a": 1}]});
        let once = canonical_json(&v);
        let reparsed: Value = serde_json::from_slice(&once).unwrap();
        let twice = canonical_json(&reparsed);
        assert_eq!(once, twice);
    }
}
