//! Canonical JSON and hashing.
//!
//! A contract's hash must be a function of its content alone, so the JSON is written in one canonical form before it
//! is hashed: object keys sorted bytewise, no insignificant whitespace, and integral floating point numbers written as
//! integers. Hashes are `Blake2b-512`, hex encoded.
use blake2::{Blake2b512, Digest};
use serde::Serialize;
use serde_json::{Number, Value};
use tari_crypto::tari_utilities::hex::to_hex;

/// Writes `value` in canonical form.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&normalize_number(n)),
        Value::String(s) => out.push_str(&Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        },
        Value::Object(map) => {
            let mut keys = map.keys().collect::<Vec<_>>();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        },
    }
}

fn normalize_number(n: &Number) -> String {
    if n.is_i64() || n.is_u64() {
        return n.to_string();
    }
    match n.as_f64() {
        #[allow(clippy::cast_possible_truncation)]
        Some(f) if f.fract() == 0.0 && f.abs() < 9.007_199_254_740_992e15 => format!("{}", f as i64),
        _ => n.to_string(),
    }
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    to_hex(Blake2b512::digest(bytes).as_slice())
}

/// The canonical hash of a JSON value.
pub fn hash_canonical(value: &Value) -> String {
    hash_bytes(canonical_json(value).as_bytes())
}

/// Serializes `item`, and returns its canonical JSON along with the hash of that JSON.
pub fn canonicalize<T: Serialize>(item: &T) -> Result<(String, String), serde_json::Error> {
    let value = serde_json::to_value(item)?;
    let json = canonical_json(&value);
    let hash = hash_bytes(json.as_bytes());
    Ok((json, hash))
}
