//! Canonical JSON bytes for deterministic hashing.
//!
//! Commit identities are content hashes, so the bytes fed to the hasher must
//! be identical for identical logical content. Canonical form:
//! - Object keys sorted lexicographically (UTF-8 byte order)
//! - No whitespace
//! - Integers only (floats rejected; their stringification is not portable)

use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Serializes `value` into canonical JSON bytes.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the value cannot be serialized or
/// contains floating-point numbers.
#[must_use = "canonical bytes should be used for hashing"]
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let v = serde_json::to_value(value).map_err(|e| Error::Serialization {
        message: e.to_string(),
    })?;
    let mut out = Vec::new();
    write_value(&v, &mut out)?;
    Ok(out)
}

fn write_value(v: &Value, out: &mut Vec<u8>) -> Result<()> {
    match v {
        Value::Null => out.extend_from_slice(b"null"),
        Value::Bool(b) => out.extend_from_slice(if *b { b"true" } else { b"false" }),
        Value::Number(n) => {
            if n.is_f64() {
                return Err(Error::Serialization {
                    message: "float values are not allowed in canonical JSON".to_string(),
                });
            }
            out.extend_from_slice(n.to_string().as_bytes());
        }
        Value::String(s) => write_string(s, out),
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        Value::Object(map) => {
            // serde_json::Map preserves insertion order by default; sort here.
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push(b'{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_string(key, out);
                out.push(b':');
                write_value(&map[key.as_str()], out)?;
            }
            out.push(b'}');
        }
    }
    Ok(())
}

fn write_string(s: &str, out: &mut Vec<u8>) {
    out.push(b'"');
    for c in s.chars() {
        match c {
            '"' => out.extend_from_slice(b"\\\""),
            '\\' => out.extend_from_slice(b"\\\\"),
            '\n' => out.extend_from_slice(b"\\n"),
            '\r' => out.extend_from_slice(b"\\r"),
            '\t' => out.extend_from_slice(b"\\t"),
            c if (c as u32) < 0x20 => {
                out.extend_from_slice(format!("\\u{:04x}", c as u32).as_bytes());
            }
            c => {
                let mut buf = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
        }
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::collections::HashMap;

    #[test]
    fn test_keys_are_sorted() {
        let mut map = HashMap::new();
        map.insert("zeta", 1);
        map.insert("alpha", 2);
        let bytes = to_canonical_bytes(&map).unwrap();
        assert_eq!(bytes, br#"{"alpha":2,"zeta":1}"#);
    }

    #[test]
    fn test_hash_map_and_btree_map_agree() {
        let mut hash = HashMap::new();
        hash.insert("b", "2");
        hash.insert("a", "1");
        let mut btree = BTreeMap::new();
        btree.insert("a", "1");
        btree.insert("b", "2");
        assert_eq!(
            to_canonical_bytes(&hash).unwrap(),
            to_canonical_bytes(&btree).unwrap()
        );
    }

    #[test]
    fn test_floats_rejected() {
        assert!(to_canonical_bytes(&1.5f64).is_err());
        assert!(to_canonical_bytes(&vec![1.0f32]).is_err());
    }

    #[test]
    fn test_string_escapes() {
        let bytes = to_canonical_bytes(&"a\"b\\c\nd").unwrap();
        assert_eq!(bytes, br#""a\"b\\c\nd""#);
    }
}
