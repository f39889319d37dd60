//! Canonical byte serialisation for signing.
//!
//! Wire-format decision, pinned here so every implementation signs the same
//! bytes:
//!   - JSON, no insignificant whitespace
//!   - object keys sorted by UTF-8 byte order, recursively
//!   - strings escaped as `serde_json` escapes them
//!   - numbers as `serde_json` prints them
//!   - the top-level `sig` member is removed; everything else (including
//!     `encrypted` and unknown extension fields) is covered
//!
//! The writer sorts explicitly instead of relying on `serde_json::Map`
//! ordering, which changes when any crate in the graph enables
//! `preserve_order`.

use serde::Serialize;
use serde_json::Value;

use crate::error::ProtoError;

pub const SIG_FIELD: &str = "sig";

pub fn canonical_bytes(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(256);
    write_value(value, &mut out);
    out
}

/// Canonical bytes of a signed (or to-be-signed) envelope value, `sig` excluded.
pub fn signing_bytes(envelope: &Value) -> Vec<u8> {
    match envelope {
        Value::Object(map) if map.contains_key(SIG_FIELD) => {
            let mut stripped = map.clone();
            stripped.remove(SIG_FIELD);
            canonical_bytes(&Value::Object(stripped))
        }
        other => canonical_bytes(other),
    }
}

/// Serialise any envelope-shaped type and return its signing bytes.
pub fn signing_bytes_of<T: Serialize>(envelope: &T) -> Result<Vec<u8>, ProtoError> {
    Ok(signing_bytes(&serde_json::to_value(envelope)?))
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
            out.push(b'{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_scalar(&Value::String(key.clone()), out);
                out.push(b':');
                write_value(&map[key.as_str()], out);
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out);
            }
            out.push(b']');
        }
        scalar => write_scalar(scalar, out),
    }
}

fn write_scalar(value: &Value, out: &mut Vec<u8>) {
    // Serialising a scalar Value into a Vec cannot fail.
    if serde_json::to_writer(&mut *out, value).is_err() {
        out.extend_from_slice(b"null");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_keys_recursively_without_whitespace() {
        let v = json!({"b": 1, "a": {"z": [true, null], "y": "é\n"}});
        assert_eq!(
            String::from_utf8(canonical_bytes(&v)).unwrap(),
            r#"{"a":{"y":"é\n","z":[true,null]},"b":1}"#
        );
    }

    #[test]
    fn sig_is_excluded_but_encrypted_is_not() {
        let a = json!({"id": "1", "sig": "AAA", "encrypted": true});
        let b = json!({"id": "1", "sig": "BBB", "encrypted": true});
        let c = json!({"id": "1", "sig": "AAA"});
        assert_eq!(signing_bytes(&a), signing_bytes(&b));
        assert_ne!(signing_bytes(&a), signing_bytes(&c));
    }

    #[test]
    fn key_order_in_input_does_not_matter() {
        let a: Value = serde_json::from_str(r#"{"x":1,"y":2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y":2,"x":1}"#).unwrap();
        assert_eq!(canonical_bytes(&a), canonical_bytes(&b));
    }
}
