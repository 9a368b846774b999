//! Canonical JSON for byte-stable collated output.
//!
//! Rules: object keys sorted lexicographically, array order preserved,
//! scalars untouched. Collation determinism rests on this.

use serde_json::{Map, Value};

/// Canonicalize a JSON value recursively: every object's keys sorted, arrays
/// left in order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| *k);
            let mut out = Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        _ => value.clone(),
    }
}

/// Canonical UTF-8 byte representation, stable across runs and machines.
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&canonicalize(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_sorts_keys_recursively() {
        let v = serde_json::json!({"b": 1, "a": {"d": 2, "c": 3}});
        let c = canonicalize(&v);
        let keys: Vec<_> = c.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["a", "b"]);
        let inner: Vec<_> = c["a"].as_object().unwrap().keys().cloned().collect();
        assert_eq!(inner, vec!["c", "d"]);
    }

    #[test]
    fn canonical_bytes_ignore_key_order() {
        let a = serde_json::json!({"a": 1, "b": [2, 3]});
        let b = serde_json::json!({"b": [2, 3], "a": 1});
        assert_eq!(
            to_canonical_bytes(&a).unwrap(),
            to_canonical_bytes(&b).unwrap()
        );
    }

    #[test]
    fn arrays_keep_order() {
        let v = serde_json::json!([3, 1, 2]);
        assert_eq!(canonicalize(&v), v);
    }
}
