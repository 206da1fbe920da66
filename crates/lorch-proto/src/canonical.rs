// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deterministic JSON normalization.
//!
//! `canonical_json` recursively rewrites mappings so keys appear in
//! lexicographic order, then emits compact JSON with no whitespace. Array
//! order is preserved; primitives and nulls pass through unchanged. We never
//! rely on `serde_json`'s own map representation to give us ordering — the
//! sort happens explicitly here so the guarantee holds regardless of which
//! serde_json feature flags a caller happens to have enabled.

use serde_json::Value;
use std::collections::BTreeMap;

/// Rewrites `value` into a form with deterministically ordered object keys.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: BTreeMap<String, Value> = BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonicalizes `value` and serializes it as compact JSON (no whitespace).
///
/// `canonical_json(x) == canonical_json(y)` whenever `x` and `y` are
/// logically equal mappings, irrespective of original key order.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value))
        .unwrap_or_else(|e| unreachable!("canonicalized value must serialize: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reorders_object_keys() {
        let a = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        let b = json!({"a": 2, "c": {"y": 2, "z": 1}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn preserves_array_order() {
        let a = json!({"list": [3, 1, 2]});
        let b = json!({"list": [1, 2, 3]});
        assert_ne!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn compact_no_whitespace() {
        let v = json!({"a": 1});
        assert_eq!(canonical_json(&v), "{\"a\":1}");
    }

    #[test]
    fn nested_arrays_of_objects_canonicalize_each_element() {
        let a = json!({"list": [{"b": 1, "a": 2}]});
        let b = json!({"list": [{"a": 2, "b": 1}]});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }
}
