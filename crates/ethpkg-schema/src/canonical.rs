//! Canonical JSON encoding.
//!
//! Signatures cover serialized JSON, so the encoding must not depend on the
//! order in which fields were inserted. Object keys are emitted in
//! lexicographic byte order at every nesting level, with no insignificant
//! whitespace.

use serde::Serialize;
use serde_json::{Map, Value};

/// Serialize `value` to canonical JSON.
///
/// # Errors
///
/// Returns an error if `value` cannot be represented as JSON (for example a
/// map with non-string keys).
pub fn to_canonical_string<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<String> {
    let value = serde_json::to_value(value)?;
    serde_json::to_string(&sort_keys(value))
}

/// Recursively rebuild every object with its keys in sorted order.
///
/// Rebuilding (instead of relying on the map type) keeps the output sorted
/// even when `serde_json` is compiled with `preserve_order`.
pub fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
            let mut sorted = Map::with_capacity(entries.len());
            for (key, inner) in entries {
                sorted.insert(key, sort_keys(inner));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_recursively() {
        let value = json!({"b": 1, "a": {"z": true, "m": [ {"y": 1, "x": 2} ]}});
        let s = to_canonical_string(&value).unwrap();
        assert_eq!(s, r#"{"a":{"m":[{"x":2,"y":1}],"z":true},"b":1}"#);
    }

    #[test]
    fn struct_field_order_does_not_matter() {
        #[derive(Serialize)]
        struct Forward {
            alpha: u8,
            beta: &'static str,
        }
        #[derive(Serialize)]
        struct Backward {
            beta: &'static str,
            alpha: u8,
        }

        let a = to_canonical_string(&Forward { alpha: 1, beta: "x" }).unwrap();
        let b = to_canonical_string(&Backward { beta: "x", alpha: 1 }).unwrap();
        assert_eq!(a, b);
    }
}
