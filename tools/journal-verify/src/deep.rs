//! Deep verification: lenient and strict passes plus journal statistics

use crate::error::{EXIT_OK, EXIT_VIOLATIONS, Result, VerifyError};
use crate::lenient::{JournalIssue, LenientOptions, LenientReport, verify_journal};
use crate::strict::{StrictOptions, StrictReport, StrictViolation, verify_strict};
use common::events::ALERT_BLOCK_PREFIX;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use storage::canonical::sha256_hex_lower;
use storage::rows::numbered_lines;
use storage::{CodecError, JournalFile, TradesFile};
use tracing::{info, warn};

/// Issues listed per section in the human summary
const HUMAN_PREVIEW: usize = 5;

/// Settings for both passes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeepOptions {
    /// Lenient pass settings
    pub lenient: LenientOptions,
    /// Strict pass settings
    pub strict: StrictOptions,
}

impl DeepOptions {
    /// Both passes checking against the same schema version
    #[must_use]
    pub fn for_schema(schema: &str) -> Self {
        Self {
            lenient: LenientOptions {
                expected_schema: schema.to_owned(),
                ..LenientOptions::default()
            },
            strict: StrictOptions {
                minimum_schema: schema.to_owned(),
                ..StrictOptions::default()
            },
        }
    }
}

/// Journal statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepStats {
    /// Events `schema_version`
    pub schema: String,
    /// Events `config_hash`
    pub config_hash: Option<String>,
    /// Events `data_version`
    pub data_version: Option<String>,
    /// Event rows
    pub events: usize,
    /// Trade rows
    pub trades: usize,
    /// Rows per event type
    pub event_types: BTreeMap<String, usize>,
    /// Rows per `ALERT_BLOCK_*` type
    pub alert_types: BTreeMap<String, usize>,
    /// Sum of `pnl_ccy`, 6 dp
    #[serde(serialize_with = "decimal_as_number")]
    pub total_pnl_ccy: Decimal,
    /// Any `ALERT_BLOCK_*` row present
    pub has_blocking_alerts: bool,
    /// Lowercase content hashes
    pub hashes: ContentHashes,
}

/// Lowercase SHA-256 of the data lines of each file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentHashes {
    /// Events without meta and header
    pub events: String,
    /// Trades without header
    pub trades: String,
}

fn decimal_as_number<S: Serializer>(value: &Decimal, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serde_json::from_str::<Value>(&value.to_string())
        .map_err(serde::ser::Error::custom)?
        .serialize(serializer)
}

/// Outcome of a deep run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeepReport {
    /// Lenient pass
    pub journal: LenientReport,
    /// Strict pass
    pub strict: StrictReport,
    /// Statistics
    pub stats: DeepStats,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JournalCheck<'a> {
    ok: bool,
    error_count: usize,
    errors: &'a [JournalIssue],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StrictCheck<'a> {
    ok: bool,
    violation_count: usize,
    violations: &'a [StrictViolation],
}

#[derive(Serialize)]
struct Checks<'a> {
    journal: JournalCheck<'a>,
    strict: StrictCheck<'a>,
}

#[derive(Serialize)]
struct DeepJson<'a> {
    ok: bool,
    checks: Checks<'a>,
    stats: &'a DeepStats,
}

impl DeepReport {
    /// Both passes clean and no blocking alert
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.journal.is_ok() && self.strict.is_ok() && !self.stats.has_blocking_alerts
    }

    /// 0 when OK, 2 otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_ok() { EXIT_OK } else { EXIT_VIOLATIONS }
    }

    /// Multi-line text for terminals
    #[must_use]
    pub fn human_summary(&self) -> String {
        let status = |ok: bool| if ok { "OK" } else { "FAIL" };
        let mut out = format!("DEEP VERIFY: {}", status(self.is_ok()));
        out.push_str(&format!(
            "\n  - Journal check: {} ({} issues)",
            status(self.journal.is_ok()),
            self.journal.error_count
        ));
        out.push_str(&format!(
            "\n  - Strict check: {} ({} violations)",
            status(self.strict.is_ok()),
            self.strict.violations.len()
        ));
        out.push_str(&format!(
            "\n  - Blocking alerts: {}",
            if self.stats.has_blocking_alerts { "present" } else { "none detected" }
        ));
        for issue in self.journal.errors.iter().take(HUMAN_PREVIEW) {
            out.push_str(&format!("\n    * {}: {}", issue.key, issue.reason));
        }
        if self.journal.errors.len() > HUMAN_PREVIEW {
            out.push_str(&format!("\n    * ...(total {})", self.journal.errors.len()));
        }
        for v in self.strict.violations.iter().take(HUMAN_PREVIEW) {
            out.push_str(&format!("\n    * {} seq={} detail={}", v.kind, v.seq, v.detail));
        }
        if self.strict.violations.len() > HUMAN_PREVIEW {
            out.push_str(&format!("\n    * ...(total {})", self.strict.violations.len()));
        }
        for (alert, count) in &self.stats.alert_types {
            out.push_str(&format!("\n    * ALERT {alert}: {count}"));
        }
        out.push_str(&format!(
            "\n  events={} trades={} schema={}",
            self.stats.events, self.stats.trades, self.stats.schema
        ));
        out
    }

    /// Indented JSON document
    pub fn to_json(&self) -> Result<String> {
        let view = DeepJson {
            ok: self.is_ok(),
            checks: Checks {
                journal: JournalCheck {
                    ok: self.journal.is_ok(),
                    error_count: self.journal.error_count,
                    errors: &self.journal.errors,
                },
                strict: StrictCheck {
                    ok: self.strict.is_ok(),
                    violation_count: self.strict.violations.len(),
                    violations: &self.strict.violations,
                },
            },
            stats: &self.stats,
        };
        serde_json::to_string_pretty(&view).map_err(|e| VerifyError::Structural(e.to_string()))
    }
}

/// Run both passes over a journal pair and gather statistics
pub fn verify_deep(events: &Path, trades: &Path, opts: &DeepOptions) -> Result<DeepReport> {
    for path in [events, trades] {
        if !path.is_file() {
            return Err(VerifyError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
            });
        }
    }
    let journal = verify_journal(events, &opts.lenient)?;
    let strict = verify_strict(events, trades, &opts.strict)?;
    let stats = build_stats(events, trades)?;

    let report = DeepReport {
        journal,
        strict,
        stats,
    };
    if report.stats.has_blocking_alerts {
        warn!(alerts = ?report.stats.alert_types, "journal carries blocking alerts");
    }
    info!(ok = report.is_ok(), "deep verification finished");
    Ok(report)
}

fn build_stats(events_path: &Path, trades_path: &Path) -> Result<DeepStats> {
    let journal = JournalFile::load(events_path)?;
    let cols = journal.columns()?;
    let mut event_types: BTreeMap<String, usize> = BTreeMap::new();
    for row in &journal.rows {
        let ty = row
            .fields
            .get(cols.event_type)
            .cloned()
            .ok_or_else(|| VerifyError::Structural(format!("event_type missing at line {}", row.line_no)))?;
        *event_types.entry(ty).or_default() += 1;
    }
    let alert_types: BTreeMap<String, usize> = event_types
        .iter()
        .filter(|(ty, _)| ty.starts_with(ALERT_BLOCK_PREFIX))
        .map(|(ty, n)| (ty.clone(), *n))
        .collect();

    let trades = TradesFile::load(trades_path)?;
    let total_pnl_ccy = trades
        .total_pnl()
        .round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero);

    Ok(DeepStats {
        schema: journal.meta.schema_version().unwrap_or_default().to_owned(),
        config_hash: journal.meta.config_hash().map(str::to_owned),
        data_version: journal.meta.data_version().map(str::to_owned),
        events: journal.rows.len(),
        trades: trades.rows.len(),
        has_blocking_alerts: alert_types.values().sum::<usize>() > 0,
        event_types,
        alert_types,
        total_pnl_ccy,
        hashes: ContentHashes {
            events: data_lines_hash(events_path, 2)?,
            trades: data_lines_hash(trades_path, 1)?,
        },
    })
}

/// Lowercase SHA-256 of the non-blank lines after the first `skip`, joined by `\n`
pub fn data_lines_hash(path: &Path, skip: usize) -> Result<String> {
    let text = fs::read_to_string(path).map_err(CodecError::io(path))?;
    let body: Vec<&str> = numbered_lines(&text).skip(skip).map(|(_, line)| line).collect();
    Ok(sha256_hex_lower(body.join("\n").as_bytes()))
}
