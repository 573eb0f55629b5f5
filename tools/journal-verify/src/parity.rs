//! Whole-file parity between two journal pairs
//!
//! Events lose their meta line; trades lose their meta line (if any) and have
//! the `config_hash` column blanked. The remaining lines are joined with `\n`
//! and hashed.

use crate::error::{EXIT_OK, EXIT_VIOLATIONS, Result, VerifyError};
use serde::Serialize;
use std::fs;
use std::path::Path;
use storage::meta::{CONFIG_HASH_KEY, SCHEMA_VERSION_KEY};
use storage::rows;
use storage::{CodecError, sha256_hex};
use tracing::{info, warn};

/// Marker for a line missing from A
pub const EOF_A: &str = "<EOF>A";
/// Marker for a line missing from B
pub const EOF_B: &str = "<EOF>B";

/// First differing normalized line, 1-based
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParityDiff {
    /// Line number after normalization
    pub line: usize,
    /// Line from A, or [`EOF_A`]
    pub a: String,
    /// Line from B, or [`EOF_B`]
    pub b: String,
}

/// Comparison of one file kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParitySection {
    /// Hashes equal
    #[serde(rename = "match")]
    pub matched: bool,
    /// Uppercase SHA-256 of A's normalized lines
    pub hash_a: String,
    /// Uppercase SHA-256 of B's normalized lines
    pub hash_b: String,
    /// Present when the hashes differ
    pub first_diff: Option<ParityDiff>,
}

impl ParitySection {
    /// Compare two normalized line lists
    #[must_use]
    pub fn compare(a: &[String], b: &[String]) -> Self {
        let hash_a = hash_lines(a);
        let hash_b = hash_lines(b);
        let matched = hash_a == hash_b;
        let first_diff = if matched { None } else { first_difference(a, b) };
        Self {
            matched,
            hash_a,
            hash_b,
            first_diff,
        }
    }
}

/// Parity of events and, when both trades paths are given, trades
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParityReport {
    /// Events section
    pub events: ParitySection,
    /// Trades section
    pub trades: Option<ParitySection>,
}

impl ParityReport {
    /// Every compared section matched
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.events.matched && self.trades.as_ref().is_none_or(|t| t.matched)
    }

    /// 0 on match, 2 otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_match() { EXIT_OK } else { EXIT_VIOLATIONS }
    }

    /// Multi-line text for terminals
    #[must_use]
    pub fn human_summary(&self) -> String {
        let mut out = format!("PARITY: {}", if self.is_match() { "OK" } else { "MISMATCH" });
        let mut section = |label: &str, s: &ParitySection| {
            out.push_str(&format!(
                "\n  {label}: {} hashA={} hashB={}",
                if s.matched { "match" } else { "mismatch" },
                s.hash_a,
                s.hash_b
            ));
            if let Some(diff) = &s.first_diff {
                out.push_str(&format!("\n    line {}\n    A: {}\n    B: {}", diff.line, diff.a, diff.b));
            }
        };
        section("events", &self.events);
        if let Some(trades) = &self.trades {
            section("trades", trades);
        }
        out
    }

    /// Indented JSON document
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| VerifyError::Structural(e.to_string()))
    }
}

/// Uppercase SHA-256 of lines joined with `\n`
#[must_use]
pub fn hash_lines(lines: &[String]) -> String {
    sha256_hex(lines.join("\n").as_bytes())
}

/// First position where the lists differ, using EOF markers past either end
#[must_use]
pub fn first_difference(a: &[String], b: &[String]) -> Option<ParityDiff> {
    (0..a.len().max(b.len())).find_map(|i| {
        let left = a.get(i).map_or(EOF_A, String::as_str);
        let right = b.get(i).map_or(EOF_B, String::as_str);
        (left != right).then(|| ParityDiff {
            line: i + 1,
            a: left.to_owned(),
            b: right.to_owned(),
        })
    })
}

fn read_lines(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(CodecError::io(path))?;
    Ok(rows::strip_bom(&text).lines().map(str::to_owned).collect())
}

fn is_meta_line(line: &str) -> bool {
    let prefix = format!("{SCHEMA_VERSION_KEY}=");
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(&prefix))
}

/// Events lines without the meta line
pub fn normalize_events(path: &Path) -> Result<Vec<String>> {
    let mut lines = read_lines(path)?;
    if lines.first().is_some_and(|l| is_meta_line(l)) {
        lines.remove(0);
    }
    Ok(lines)
}

/// Trades records without a meta line and with `config_hash` blanked, each
/// re-serialized as one CSV record
pub fn normalize_trades(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path).map_err(CodecError::io(path))?;
    let text = rows::strip_bom(&text);
    let (body, first_line) = match rows::split_first_line(text) {
        Some((line_no, first, rest)) if is_meta_line(first) => (rest, line_no + 1),
        _ => (text, 1),
    };
    let mut records = rows::read_rows(body, first_line)?;
    let hash_column = records.first().and_then(|header| {
        header
            .fields
            .iter()
            .position(|c| c.trim().eq_ignore_ascii_case(CONFIG_HASH_KEY))
    });
    if let Some(idx) = hash_column {
        for row in records.iter_mut().skip(1) {
            if let Some(cell) = row.fields.get_mut(idx) {
                cell.clear();
            }
        }
    }
    records
        .iter()
        .map(|row| rows::join_row(&row.fields).map_err(VerifyError::from))
        .collect()
}

/// Compare events, and trades when both paths are given
pub fn parity_snapshot(
    events_a: &Path,
    events_b: &Path,
    trades: Option<(&Path, &Path)>,
) -> Result<ParityReport> {
    let events = ParitySection::compare(&normalize_events(events_a)?, &normalize_events(events_b)?);
    let trades = trades
        .map(|(a, b)| -> Result<_> {
            Ok(ParitySection::compare(&normalize_trades(a)?, &normalize_trades(b)?))
        })
        .transpose()?;
    let report = ParityReport { events, trades };
    if report.is_match() {
        info!("parity snapshot matched");
    } else {
        warn!(
            events = report.events.matched,
            trades = report.trades.as_ref().map(|t| t.matched),
            "parity snapshot mismatch"
        );
    }
    Ok(report)
}

/// Diagnostic text around the first differing line of a section
#[must_use]
pub fn context_dump(label: &str, a: &[String], b: &[String], section: &ParitySection, context: usize) -> String {
    let mut out = format!("[{label}] hashA={} hashB={}", section.hash_a, section.hash_b);
    let Some(diff) = &section.first_diff else {
        out.push_str("\nno difference");
        return out;
    };
    out.push_str(&format!("\nfirst difference at line {}", diff.line));
    let center = diff.line - 1;
    let from = center.saturating_sub(context);
    let to = (center + context + 1).min(a.len().max(b.len()));
    for i in from..to {
        let marker = if i == center { '>' } else { ' ' };
        let left = a.get(i).map_or(EOF_A, String::as_str);
        let right = b.get(i).map_or(EOF_B, String::as_str);
        out.push_str(&format!("\n{marker}{:>6} A: {left}\n{marker}{:>6} B: {right}", i + 1, i + 1));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn test_first_difference_past_end() {
        let a = lines(&["x", "y"]);
        let b = lines(&["x"]);
        assert_eq!(
            first_difference(&a, &b),
            Some(ParityDiff {
                line: 2,
                a: "y".into(),
                b: EOF_B.into()
            })
        );
        assert_eq!(first_difference(&a, &a), None);
    }

    #[test]
    fn test_compare_hashes() {
        let a = lines(&["h", "1"]);
        let section = ParitySection::compare(&a, &a);
        assert!(section.matched);
        assert!(section.first_diff.is_none());
        assert_eq!(section.hash_a, hash_lines(&a));
    }

    #[test]
    fn test_trades_normalization_blanks_hash_in_quoted_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let b = dir.path().join("b.csv");
        fs::write(&a, "schema_version=1.3.0\nsymbol,decision_id,config_hash\nEURUSD,\"D1,\nretry\",AAA\n").unwrap();
        fs::write(&b, "symbol,decision_id,config_hash\nEURUSD,\"D1,\nretry\",BBB\n").unwrap();

        let left = normalize_trades(&a).unwrap();
        assert_eq!(left, lines(&["symbol,decision_id,config_hash", "EURUSD,\"D1,\nretry\","]));
        assert_eq!(left, normalize_trades(&b).unwrap());
    }

    #[test]
    fn test_context_dump_marks_line() {
        let a = lines(&["h", "1", "2"]);
        let b = lines(&["h", "1", "3"]);
        let section = ParitySection::compare(&a, &b);
        let dump = context_dump("events", &a, &b, &section, 1);
        assert!(dump.contains("first difference at line 3"));
        assert!(dump.contains(">     3 A: 2"));
        assert!(dump.contains(">     3 B: 3"));
    }
}
