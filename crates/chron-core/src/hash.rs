//! Content-addressed identities for feed payloads.
//!
//! Two payloads that are structurally identical must collapse onto one
//! record, so the hash is taken over a canonical rendering rather than the
//! bytes the feed happened to send:
//!
//! - Compact: no whitespace between tokens.
//! - Object keys sorted lexicographically at every depth.
//! - Arrays keep their order.
//!
//! The full BLAKE3 digest is used. Hash format: `blake3:<lowercase hex>`.

use serde_json::{Map, Value};

/// Prefix shared by every content hash.
pub const HASH_PREFIX: &str = "blake3:";

/// Render a [`Value`] as canonical JSON.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    sorted(value).to_string()
}

// Rebuild objects with keys inserted in sorted order so the output does not
// depend on whether `serde_json` was compiled with `preserve_order`.
fn sorted(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::with_capacity(map.len());
            for key in keys {
                if let Some(inner) = map.get(key) {
                    out.insert(key.clone(), sorted(inner));
                }
            }
            Value::Object(out)
        }
        other => other.clone(),
    }
}

/// Compute the content hash of a payload.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use chron_core::hash::content_hash;
///
/// let a = json!({"id": "g1", "inning": 3});
/// let b = json!({"inning": 3, "id": "g1"});
/// assert_eq!(content_hash(&a), content_hash(&b));
/// ```
#[must_use]
pub fn content_hash(value: &Value) -> String {
    let canonical = canonical_json(value);
    let digest = blake3::hash(canonical.as_bytes());
    format!("{HASH_PREFIX}{}", digest.to_hex())
}

/// Returns `true` if `s` looks like a hash produced by [`content_hash`].
#[must_use]
pub fn is_content_hash(s: &str) -> bool {
    s.strip_prefix(HASH_PREFIX).is_some_and(|hex| {
        hex.len() == 64 && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_sorts_nested_keys() {
        let val = json!({"z": 1, "a": {"c": 3, "b": 2}, "m": [{"y": 1, "x": 2}]});
        assert_eq!(
            canonical_json(&val),
            r#"{"a":{"b":2,"c":3},"m":[{"x":2,"y":1}],"z":1}"#
        );
    }

    #[test]
    fn key_order_does_not_change_hash() {
        let a: Value = serde_json::from_str(r#"{"b": [1, 2], "a": {"y": null, "x": true}}"#)
            .expect("parse a");
        let b: Value = serde_json::from_str(r#"{"a":{"x":true,"y":null},"b":[1,2]}"#)
            .expect("parse b");
        assert_eq!(content_hash(&a), content_hash(&b));
    }

    #[test]
    fn array_order_changes_hash() {
        assert_ne!(content_hash(&json!([1, 2])), content_hash(&json!([2, 1])));
    }

    #[test]
    fn hash_format() {
        let hash = content_hash(&json!({"id": "x"}));
        assert!(hash.starts_with(HASH_PREFIX));
        assert!(is_content_hash(&hash));
        assert!(!is_content_hash("blake3:xyz"));
        assert!(!is_content_hash("sha256:00"));
    }
}
