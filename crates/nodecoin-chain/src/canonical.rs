//! Canonical JSON encoding and hashing.
//!
//! The canonical form is the pre-image for every hash and signature in the
//! system: block hashes, state hashes, and signed shared-world items. Objects
//! emit their keys in sorted order, arrays preserve order, and no whitespace
//! is produced, so two semantically equal values always hash identically no
//! matter how their maps were built.

use serde_json::Value;
use sha2::{Digest, Sha256, Sha512};

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a JSON value canonically: key-sorted objects, compact separators.
pub fn canonical_encode(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            out.push('{');
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_scalar(out, &Value::String((*key).clone()));
                out.push(':');
                write_value(out, &map[key.as_str()]);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        scalar => write_scalar(out, scalar),
    }
}

fn write_scalar(out: &mut String, value: &Value) {
    // Strings, numbers, booleans and null have exactly one compact rendering.
    out.push_str(&serde_json::to_string(value).expect("scalar JSON serialization is infallible"));
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Lowercase-hex SHA-256 of raw bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Lowercase-hex SHA-256 of a value's canonical encoding.
pub fn hash_value(value: &Value) -> String {
    sha256_hex(canonical_encode(value).as_bytes())
}

/// Raw SHA-512 digest, used for node address derivation.
pub fn sha512_bytes(bytes: &[u8]) -> [u8; 64] {
    Sha512::digest(bytes).into()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -- 1. Shape -------------------------------------------------------------

    #[test]
    fn objects_are_key_sorted_and_compact() {
        let v = json!({"b": 1, "a": {"z": true, "y": null}, "c": [3, 1, 2]});
        assert_eq!(
            canonical_encode(&v),
            r#"{"a":{"y":null,"z":true},"b":1,"c":[3,1,2]}"#
        );
    }

    #[test]
    fn arrays_preserve_order() {
        let v = json!(["c", "a", "b"]);
        assert_eq!(canonical_encode(&v), r#"["c","a","b"]"#);
    }

    #[test]
    fn strings_are_escaped() {
        let v = json!({"msg": "line\nbreak \"quoted\""});
        assert_eq!(canonical_encode(&v), r#"{"msg":"line\nbreak \"quoted\""}"#);
    }

    // -- 2. Stability law -----------------------------------------------------

    #[test]
    fn key_order_does_not_change_the_hash() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": [1, 2], "z": {"k": "v"}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"z": {"k": "v"}, "y": [1, 2], "x": 1}"#).unwrap();
        assert_eq!(hash_value(&a), hash_value(&b));
    }

    #[test]
    fn different_values_different_hashes() {
        assert_ne!(hash_value(&json!({"a": 1})), hash_value(&json!({"a": 2})));
    }

    // -- 3. Hash format -------------------------------------------------------

    #[test]
    fn sha256_hex_is_lowercase_64_chars() {
        let h = sha256_hex(b"nodecoin");
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn sha256_known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    // -- 4. Property: canonical encoding round-trips through serde ------------

    proptest::proptest! {
        #[test]
        fn canonical_output_is_valid_json(keys in proptest::collection::vec("[a-z]{1,8}", 1..8), nums in proptest::collection::vec(-1000i64..1000, 1..8)) {
            let mut map = serde_json::Map::new();
            for (k, n) in keys.iter().zip(nums.iter()) {
                map.insert(k.clone(), json!(n));
            }
            let v = Value::Object(map);
            let encoded = canonical_encode(&v);
            let reparsed: Value = serde_json::from_str(&encoded).unwrap();
            proptest::prop_assert_eq!(&reparsed, &v);
            // Re-encoding the reparsed value is a fixed point.
            proptest::prop_assert_eq!(canonical_encode(&reparsed), encoded);
        }
    }
}
