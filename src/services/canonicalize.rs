//! Stable-key-order JSON canonicalization.
//!
//! Used by the dedup engine (section 4.2 step 5, section 8) to hash
//! requirement/parameter bags in a way that's insensitive to key
//! insertion order but sensitive to structure: `hash_goal_key(a, b, c)`
//! must differ from `hash_goal_key(a+b, c)` (separator injection would
//! otherwise collide two distinct key tuples).

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Recursively sorts object keys so two structurally-equal JSON values
/// serialize identically regardless of original key order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = serde_json::Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical JSON string for `value`, suitable for hashing.
pub fn canonical_string(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).unwrap_or_default()
}

/// SHA-256 digest of `value`'s canonical form, hex-encoded.
pub fn digest(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Joins key components with a separator that cannot itself be produced
/// by concatenating two adjacent components, preventing
/// `hash_goal_key(a, b, c) == hash_goal_key(a+b, c)`-style collisions:
/// each component is length-prefixed before joining.
pub fn hash_goal_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.len().to_le_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}
