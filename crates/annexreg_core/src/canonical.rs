//! Canonical JSON — the unique textual form used for snapshot hashing.
//!
//! Rules: object keys sorted lexicographically at every nesting level, no
//! insignificant whitespace, ASCII-only output (`\uXXXX` escapes above
//! 0x7E and for all control characters), numbers in their shortest
//! round-trip form (integers without a decimal point). Array order is
//! emitted as given — callers sort order-insensitive arrays before
//! serializing.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize `value` to its canonical textual form.
pub fn canonical_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

/// Lowercase 64-hex SHA-256 of the canonical form.
pub fn canonical_sha256(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_string(value).as_bytes());
    hex::encode(hasher.finalize())
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        // serde_json renders i64/u64 plainly and f64 via the shortest
        // round-trip algorithm, which is exactly the canonical rule.
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => write_string(out, s),
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
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, &map[*key]);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c if (c as u32) > 0x7e => {
                let cp = c as u32;
                if cp > 0xffff {
                    // Escape astral characters as a UTF-16 surrogate pair.
                    let v = cp - 0x10000;
                    let hi = 0xd800 + (v >> 10);
                    let lo = 0xdc00 + (v & 0x3ff);
                    out.push_str(&format!("\\u{hi:04x}\\u{lo:04x}"));
                } else {
                    out.push_str(&format!("\\u{cp:04x}"));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_sorted_no_whitespace() {
        let v = json!({"b": 1, "a": {"z": true, "m": null}});
        assert_eq!(canonical_string(&v), r#"{"a":{"m":null,"z":true},"b":1}"#);
    }

    #[test]
    fn integers_have_no_decimal_point() {
        let v = json!({"n": 3, "f": 2.5});
        assert_eq!(canonical_string(&v), r#"{"f":2.5,"n":3}"#);
    }

    #[test]
    fn non_ascii_is_escaped() {
        let v = json!("Z\u{fc}rich");
        assert_eq!(canonical_string(&v), "\"Z\\u00fcrich\"");
    }

    #[test]
    fn control_chars_are_escaped() {
        let v = json!("a\nb\tc");
        assert_eq!(canonical_string(&v), "\"a\\u000ab\\u0009c\"");
    }

    #[test]
    fn astral_chars_use_surrogate_pairs() {
        // U+1F3AF encodes as the surrogate pair d83c/dfaf.
        let v = json!("\u{1F3AF}");
        assert_eq!(canonical_string(&v), "\"\\ud83c\\udfaf\"");
    }

    #[test]
    fn hash_ignores_insertion_order() {
        let a = json!({"x": 1, "y": [1, 2], "z": "s"});
        // Same logical content built in a different insertion order.
        let mut m = serde_json::Map::new();
        m.insert("z".into(), json!("s"));
        m.insert("y".into(), json!([1, 2]));
        m.insert("x".into(), json!(1));
        let b = Value::Object(m);
        assert_eq!(canonical_sha256(&a), canonical_sha256(&b));
    }

    #[test]
    fn hash_is_64_lowercase_hex() {
        let h = canonical_sha256(&json!({"k": "v"}));
        assert_eq!(h.len(), 64);
        assert!(h.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn single_character_change_changes_hash() {
        let a = json!({"intended_purpose": "screening"});
        let b = json!({"intended_purpose": "screeninG"});
        assert_ne!(canonical_sha256(&a), canonical_sha256(&b));
    }
}
