//! Canonical content checksums for definition bodies.
//!
//! The checksum must be stable under any value-preserving reserialization
//! of the body, so it is computed over a canonical structural form: object
//! keys sorted recursively, compact separators, no insignificant
//! whitespace. Array order is significant and preserved.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Compute a SHA-256 hex digest of the given bytes.
pub fn sha256_hex(data: &[u8]) -> String {
    let hash = Sha256::digest(data);
    format!("{hash:x}")
}

/// Compute the canonical checksum of a definition body.
pub fn of_value(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    sha256_hex(out.as_bytes())
}

/// Serialize `value` canonically into `out`.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json's string serialization never fails.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
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
        scalar => out.push_str(&scalar.to_string()),
    }
}
