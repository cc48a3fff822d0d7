// Request fingerprinting - canonical JSON + SHA-256
// Author: kelexine (https://github.com/kelexine)

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuild `value` with every object's keys in sorted order.
///
/// Independent of whether serde_json preserves insertion order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Compact canonical serialization; the input to [`fingerprint`].
pub fn canonical_string(value: &Value) -> String {
    canonicalize(value).to_string()
}

/// Indented canonical serialization, used for line diffs.
pub fn canonical_pretty(value: &Value) -> String {
    format!("{:#}", canonicalize(value))
}

/// Lowercase hex SHA-256 of the canonical request body.
pub fn fingerprint(value: &Value) -> String {
    let digest = Sha256::digest(canonical_string(value).as_bytes());
    hex::encode(digest)
}
