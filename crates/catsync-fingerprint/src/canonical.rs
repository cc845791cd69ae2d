//! Canonical JSON encoding
//!
//! Fingerprints must not depend on map iteration order, so values are
//! re-encoded with object keys sorted at every level before hashing.

use serde_json::Value;
use std::fmt::Write as _;

/// Encode `value` as compact JSON with object keys sorted recursively
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// Remove the given top-level keys from an object value
///
/// Non-object values are left untouched.
pub fn strip_fields(value: &mut Value, excluded: &[&str]) {
    if let Value::Object(map) = value {
        for key in excluded {
            map.remove(*key);
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Strings always serialize
                let _ = write!(out, "{}", Value::String(key.clone()));
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => {
            let _ = write!(out, "{scalar}");
        }
    }
}
