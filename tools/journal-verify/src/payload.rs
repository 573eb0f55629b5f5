//! Field access on event payloads

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Follow a dotted path, matching each segment case-insensitively
#[must_use]
pub fn lookup_ci<'a>(root: &'a Value, dotted: &str) -> Option<&'a Value> {
    dotted.split('.').try_fold(root, |current, segment| {
        current
            .as_object()?
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(segment))
            .map(|(_, v)| v)
    })
}

/// Strings unquoted, everything else as its JSON text
#[must_use]
pub fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Text of a dotted field, when present
#[must_use]
pub fn field_text(root: &Value, dotted: &str) -> Option<String> {
    lookup_ci(root, dotted).map(scalar_text)
}

/// Symbol an event refers to: `symbol`, then `InstrumentId.Value`, then a
/// flat string `InstrumentId`
#[must_use]
pub fn symbol_of(payload: &Value) -> Option<&str> {
    let obj = payload.as_object()?;
    if let Some(Value::String(s)) = obj.get("symbol") {
        return Some(s);
    }
    match obj.get("InstrumentId") {
        Some(Value::Object(inner)) => inner.get("Value").and_then(Value::as_str),
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

/// Leaf values keyed by lowercased dotted path; array items as `path[i]`
#[must_use]
pub fn flatten(payload: &Value) -> FxHashMap<String, String> {
    fn walk(value: &Value, prefix: &str, out: &mut FxHashMap<String, String>) {
        match value {
            Value::Object(map) => {
                for (name, child) in map {
                    let next = if prefix.is_empty() {
                        name.to_ascii_lowercase()
                    } else {
                        format!("{prefix}.{}", name.to_ascii_lowercase())
                    };
                    walk(child, &next, out);
                }
            }
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    walk(item, &format!("{prefix}[{i}]"), out);
                }
            }
            leaf => {
                out.insert(prefix.to_owned(), scalar_text(leaf));
            }
        }
    }
    let mut out = FxHashMap::default();
    walk(payload, "", &mut out);
    out
}

/// Whether numeric text uses an exponent or a comma decimal separator
#[must_use]
pub fn has_bad_numeric_format(raw: &str) -> bool {
    raw.contains(['e', 'E', ','])
}

/// Whether a string looks like a number written with a comma decimal separator
#[must_use]
pub fn is_comma_decimal(raw: &str) -> bool {
    raw.contains(',')
        && raw.chars().any(|c| c.is_ascii_digit())
        && raw
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-' | '+'))
}

/// Dotted path of the first leaf matching `pred`, depth first in key order
pub fn find_leaf(payload: &Value, pred: &impl Fn(&Value) -> bool) -> Option<String> {
    fn walk(value: &Value, path: &str, pred: &impl Fn(&Value) -> bool) -> Option<String> {
        match value {
            Value::Object(map) => map.iter().find_map(|(name, child)| {
                let next = if path.is_empty() { name.clone() } else { format!("{path}.{name}") };
                walk(child, &next, pred)
            }),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .find_map(|(i, item)| walk(item, &format!("{path}[{i}]"), pred)),
            leaf => pred(leaf).then(|| path.to_owned()),
        }
    }
    walk(payload, "", pred)
}

/// Dotted path of the first number written with an exponent
#[must_use]
pub fn first_exponent_number(payload: &Value) -> Option<String> {
    find_leaf(payload, &|v| {
        matches!(v, Value::Number(n) if has_bad_numeric_format(&n.to_string()))
    })
}

/// Dotted path of the first string holding a comma-decimal number
#[must_use]
pub fn first_comma_decimal(payload: &Value) -> Option<String> {
    find_leaf(payload, &|v| v.as_str().is_some_and(is_comma_decimal))
}
