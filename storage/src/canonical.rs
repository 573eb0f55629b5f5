//! Canonical byte forms and SHA-256 helpers
//!
//! Canonical JSON sorts object keys ordinally, keeps array order and writes
//! no whitespace. Number literals are emitted exactly as parsed, so `1E2`
//! and `100` hash differently.

use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serialize a JSON value in canonical form
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(&mut out, value);
    out
}

/// Parse JSON text and re-emit it canonically
pub fn canonicalize_json_text(raw: &str) -> Result<String, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    Ok(canonical_json(&value))
}

fn write_canonical(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_canonical(out, item);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(out, item);
            }
            out.push(']');
        }
        // Scalars share serde_json's compact rendering.
        scalar => {
            out.push_str(&scalar.to_string());
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push_str(&Value::String(s.to_owned()).to_string());
}

/// Uppercase hex SHA-256
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(bytes))
}

/// Lowercase hex SHA-256, used in verification reports
#[must_use]
pub fn sha256_hex_lower(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Normalize CSV text: LF line endings, no trailing spaces or tabs per line.
///
/// A trailing line terminator is dropped.
#[must_use]
pub fn canonicalize_csv(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    normalized
        .lines()
        .map(|line| line.trim_end_matches([' ', '\t']))
        .collect::<Vec<_>>()
        .join("\n")
}
