//! Composite-key diff between two journals

use crate::error::{EXIT_OK, EXIT_VIOLATIONS, Result, VerifyError};
use crate::payload::flatten;
use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use storage::canonical::sha256_hex_lower;
use storage::rows::numbered_lines;
use storage::{CodecError, JournalFile, canonical_json};
use tracing::{debug, info};

/// Keys printed per category in the summary
pub const SUMMARY_LIMIT: usize = 50;

/// Keys for bar journals
pub const BAR_KEYS: [&str; 4] = ["instrumentId", "intervalSeconds", "openTimeUtc", "eventType"];
/// Keys for risk-probe journals
pub const RISK_PROBE_KEYS: [&str; 3] = ["instrumentId", "eventType", "utc_ts"];
/// Keys for everything else
pub const EVENT_KEYS: [&str; 2] = ["utc_ts", "event_type"];

/// Differences between journal A and journal B
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffOutcome {
    /// Keys only in A, preceded by `DUP(A):` entries when duplicates are reported
    pub only_in_a: Vec<String>,
    /// Keys only in B, preceded by `DUP(B):` entries when duplicates are reported
    pub only_in_b: Vec<String>,
    /// Keys in both whose canonical payloads differ
    pub payload_mismatch: Vec<String>,
}

impl DiffOutcome {
    /// Any difference at all
    #[must_use]
    pub fn has_diff(&self) -> bool {
        !(self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.payload_mismatch.is_empty())
    }

    /// 0 when identical, 2 otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.has_diff() { EXIT_VIOLATIONS } else { EXIT_OK }
    }

    /// Text report listing at most `limit` keys per category
    #[must_use]
    pub fn summary(&self, limit: usize) -> String {
        if !self.has_diff() {
            return "No differences detected.".to_owned();
        }
        let mut out = "DIFF SUMMARY:".to_owned();
        let sections = [
            ("Present only in A", &self.only_in_a),
            ("Present only in B", &self.only_in_b),
            ("Payload mismatches", &self.payload_mismatch),
        ];
        for (label, keys) in sections {
            if !keys.is_empty() {
                let shown: Vec<&str> = keys.iter().take(limit).map(String::as_str).collect();
                out.push_str(&format!("\n  {label}: {}", shown.join(";")));
            }
        }
        out.push_str(&format!("\n(showing at most {limit} keys per category)"));
        out
    }
}

/// Pick key fields by sniffing the first data row of `path`
pub fn infer_default_keys(path: &Path) -> Result<Vec<String>> {
    let text = std::fs::read_to_string(path).map_err(CodecError::io(path))?;
    let first = numbered_lines(&text).nth(2).map(|(_, line)| line.to_ascii_uppercase());
    let keys: &[&str] = match first {
        Some(line) if line.contains("INTERVALSECONDS") => &BAR_KEYS,
        Some(line) if line.contains("RISK_PROBE_V1") => &RISK_PROBE_KEYS,
        _ => &EVENT_KEYS,
    };
    Ok(keys.iter().map(|k| (*k).to_owned()).collect())
}

#[derive(Debug, Default)]
struct KeyedRows {
    order: Vec<String>,
    hashes: FxHashMap<String, String>,
    duplicates: Vec<String>,
}

impl KeyedRows {
    fn insert(&mut self, key: String, hash: String) {
        if self.hashes.contains_key(&key) {
            if !self.duplicates.contains(&key) {
                self.duplicates.push(key);
            }
        } else {
            self.order.push(key.clone());
            self.hashes.insert(key, hash);
        }
    }
}

/// Diff two journals on `key_fields`
pub fn diff_journals(
    path_a: &Path,
    path_b: &Path,
    key_fields: &[String],
    report_duplicates: bool,
) -> Result<DiffOutcome> {
    let rows_a = load_keyed(path_a, key_fields)?;
    let rows_b = load_keyed(path_b, key_fields)?;
    debug!(a = rows_a.order.len(), b = rows_b.order.len(), "keyed rows loaded");

    let mut outcome = DiffOutcome::default();
    if report_duplicates {
        outcome
            .only_in_a
            .extend(rows_a.duplicates.iter().map(|k| format!("DUP(A):{k}")));
        outcome
            .only_in_b
            .extend(rows_b.duplicates.iter().map(|k| format!("DUP(B):{k}")));
    }
    for key in &rows_a.order {
        match rows_b.hashes.get(key) {
            None => outcome.only_in_a.push(key.clone()),
            Some(hash_b) if rows_a.hashes.get(key) != Some(hash_b) => {
                outcome.payload_mismatch.push(key.clone());
            }
            Some(_) => {}
        }
    }
    outcome.only_in_b.extend(
        rows_b
            .order
            .iter()
            .filter(|k| !rows_a.hashes.contains_key(*k))
            .cloned(),
    );

    info!(
        only_a = outcome.only_in_a.len(),
        only_b = outcome.only_in_b.len(),
        mismatched = outcome.payload_mismatch.len(),
        "diff finished"
    );
    Ok(outcome)
}

fn load_keyed(path: &Path, key_fields: &[String]) -> Result<KeyedRows> {
    let journal = JournalFile::load(path)?;
    let column_of: FxHashMap<String, usize> = journal
        .header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_ascii_lowercase(), i))
        .collect();
    let payload_idx = *column_of
        .get("payload_json")
        .ok_or_else(|| VerifyError::Structural("payload_json column missing".to_owned()))?;
    let type_idx = column_of.get("event_type").copied();

    let mut keyed = KeyedRows::default();
    for row in &journal.rows {
        let parts = &row.fields;
        if parts.len() != journal.header.len() {
            return Err(VerifyError::Structural(format!("Column mismatch line {}", row.line_no)));
        }
        let payload: Value = serde_json::from_str(&parts[payload_idx]).map_err(|e| {
            VerifyError::Structural(format!("line {}: payload_json not valid JSON: {e}", row.line_no))
        })?;
        let flat = flatten(&payload);
        let event_type = type_idx.map_or("", |i| parts[i].as_str());

        let mut key = String::new();
        for (i, field) in key_fields.iter().enumerate() {
            let value = key_value(field, parts, &column_of, &flat, event_type).ok_or_else(|| {
                VerifyError::Structural(format!("Key field '{field}' not found in columns or payload"))
            })?;
            if i > 0 {
                key.push('|');
            }
            key.push_str(value);
        }
        keyed.insert(key, sha256_hex_lower(canonical_json(&payload).as_bytes()));
    }
    Ok(keyed)
}

fn key_value<'a>(
    field: &str,
    parts: &'a [String],
    column_of: &FxHashMap<String, usize>,
    flat: &'a FxHashMap<String, String>,
    event_type: &'a str,
) -> Option<&'a str> {
    let lower = field.to_ascii_lowercase();
    if let Some(&i) = column_of.get(&lower) {
        return Some(&parts[i]);
    }
    if let Some(v) = flat.get(&lower) {
        return Some(v);
    }
    match lower.as_str() {
        "instrumentid" => flat.get("instrumentid.value").map(String::as_str),
        "opentimeutc" if flat.contains_key("startutc") => flat.get("startutc").map(String::as_str),
        "eventtype" if !event_type.is_empty() => Some(event_type),
        "intervalseconds" | "opentimeutc" if event_type == "RISK_PROBE_V1" => Some(""),
        _ => None,
    }
}
