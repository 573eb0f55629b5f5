//! Strict journal verification
//!
//! A single pass over the events file tracks sequence, timestamp and the
//! previous event type; a second pass over the parsed events applies the
//! adjacency rules, required fields and numeric-format checks. The trades
//! file is then cross-checked against the events file.

use crate::error::{EXIT_OK, EXIT_VIOLATIONS, Result, VerifyError};
use crate::payload::{
    first_comma_decimal, first_exponent_number, has_bad_numeric_format, symbol_of,
};
use chrono::{DateTime, Utc};
use common::{EventType, FeatureMode, SCHEMA_VERSION, parse_utc};
use rustc_hash::FxHashSet;
use serde::Serialize;
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;
use storage::{CodecError, JournalFile, TRADES_HEADER, TradesFile};
use tracing::{debug, error, info};

/// Minimum trade row width; `src_adapter` may be missing on older files
const MIN_TRADE_FIELDS: usize = 13;

const TRADE_DECIMAL_COLUMNS: [&str; 4] = ["entry_price", "exit_price", "pnl_ccy", "pnl_r"];

/// Strict run settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrictOptions {
    /// Lowest acceptable `schema_version`
    pub minimum_schema: String,
    /// Sentiment mode the run was configured with, when known
    pub sentiment_mode: Option<FeatureMode>,
    /// Accept a required predecessor anywhere earlier in the same bar group
    pub lenient_order: bool,
}

impl Default for StrictOptions {
    fn default() -> Self {
        Self {
            minimum_schema: SCHEMA_VERSION.to_owned(),
            sentiment_mode: None,
            lenient_order: false,
        }
    }
}

/// Violation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Envelope lines missing or unreadable
    FileFormat,
    /// `schema_version` missing or below the minimum
    SchemaVersion,
    /// Row does not split into the header's columns
    RowFormat,
    /// Sequence column is not an integer
    SequenceParse,
    /// Sequence did not increase
    SequenceNonmonotonic,
    /// Timestamp missing, unparseable or not UTC
    Timestamp,
    /// Adjacency rule, timestamp regression or event after a QA abort
    OrderViolation,
    /// Event type outside the known set
    UnknownEvent,
    /// Payload is not JSON
    PayloadJson,
    /// Required payload field absent or of the wrong type
    MissingField,
    /// Exponent or comma-decimal number
    NumericFormat,
    /// Event not allowed in the configured feature mode
    ModeViolation,
    /// Trade row too short
    TradeRow,
    /// Trade symbol absent from the events
    SymbolSet,
    /// Trade stamp differs from the events meta line
    MetaMismatch,
}

impl ViolationKind {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FileFormat => "file_format",
            Self::SchemaVersion => "schema_version",
            Self::RowFormat => "row_format",
            Self::SequenceParse => "sequence_parse",
            Self::SequenceNonmonotonic => "sequence_nonmonotonic",
            Self::Timestamp => "timestamp",
            Self::OrderViolation => "order_violation",
            Self::UnknownEvent => "unknown_event",
            Self::PayloadJson => "payload_json",
            Self::MissingField => "missing_field",
            Self::NumericFormat => "numeric_format",
            Self::ModeViolation => "mode_violation",
            Self::TradeRow => "trade_row",
            Self::SymbolSet => "symbol_set",
            Self::MetaMismatch => "meta_mismatch",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One strict finding. `seq` is 0 for file-level and trade findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrictViolation {
    /// Category
    pub kind: ViolationKind,
    /// Offending sequence
    pub seq: u64,
    /// Symbol involved, when known
    pub symbol: Option<String>,
    /// Raw timestamp involved, when known
    pub ts: Option<String>,
    /// Free text
    pub detail: String,
}

/// Outcome of a strict run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrictReport {
    /// `schema_version` from the events meta line
    pub schema: String,
    /// Events that parsed far enough to be rule-checked
    pub events_checked: usize,
    /// Trade data rows
    pub trades_checked: usize,
    /// Findings sorted by sequence, then kind
    pub violations: Vec<StrictViolation>,
}

#[derive(Serialize)]
struct Checked {
    events: usize,
    trades: usize,
}

#[derive(Serialize)]
struct Summary {
    checked: Checked,
    violations: usize,
}

#[derive(Serialize)]
struct StrictJson<'a> {
    schema: &'a str,
    summary: Summary,
    violations: &'a [StrictViolation],
}

impl StrictReport {
    /// No violations
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    /// 0 when clean, 2 otherwise
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_ok() { EXIT_OK } else { EXIT_VIOLATIONS }
    }

    /// Violations of one kind
    pub fn of_kind(&self, kind: ViolationKind) -> impl Iterator<Item = &StrictViolation> {
        self.violations.iter().filter(move |v| v.kind == kind)
    }

    /// Multi-line text for terminals
    #[must_use]
    pub fn human_summary(&self) -> String {
        if self.is_ok() {
            return format!(
                "STRICT VERIFY: OK ({} events, {} trades)",
                self.events_checked, self.trades_checked
            );
        }
        let mut out = format!("STRICT VERIFY: FAIL ({} violation(s))", self.violations.len());
        for v in &self.violations {
            out.push_str(&format!("\n - [{}] seq={}", v.kind, v.seq));
            if let Some(symbol) = &v.symbol {
                out.push_str(&format!(" symbol={symbol}"));
            }
            out.push_str(&format!(" {}", v.detail));
        }
        out
    }

    /// Indented JSON document
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(&self.json_view())
            .map_err(|e| VerifyError::Structural(e.to_string()))
    }

    /// JSON value of the report
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self.json_view()).unwrap_or(Value::Null)
    }

    fn json_view(&self) -> StrictJson<'_> {
        StrictJson {
            schema: &self.schema,
            summary: Summary {
                checked: Checked {
                    events: self.events_checked,
                    trades: self.trades_checked,
                },
                violations: self.violations.len(),
            },
            violations: &self.violations,
        }
    }

    /// `Err(Violations)` unless clean
    pub fn into_result(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(VerifyError::Violations {
                count: self.violations.len(),
                exit_code: EXIT_VIOLATIONS,
            })
        }
    }
}

#[derive(Debug)]
struct ParsedEvent {
    seq: u64,
    ts: String,
    ty: EventType,
    payload: Value,
}

impl ParsedEvent {
    fn symbol(&self) -> Option<String> {
        symbol_of(&self.payload).map(str::to_owned)
    }
}

#[derive(Debug, Default)]
struct Findings(Vec<StrictViolation>);

impl Findings {
    fn file(&mut self, kind: ViolationKind, detail: impl Into<String>) {
        self.push(kind, 0, None, None, detail);
    }

    fn event(&mut self, kind: ViolationKind, ev: &ParsedEvent, detail: impl Into<String>) {
        self.push(kind, ev.seq, ev.symbol(), Some(ev.ts.clone()), detail);
    }

    fn push(
        &mut self,
        kind: ViolationKind,
        seq: u64,
        symbol: Option<String>,
        ts: Option<String>,
        detail: impl Into<String>,
    ) {
        self.0.push(StrictViolation {
            kind,
            seq,
            symbol,
            ts,
            detail: detail.into(),
        });
    }
}

/// Compare dotted versions numerically per component; falls back to string
/// order when either side has a non-numeric component
#[must_use]
pub fn compare_schema(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| {
        v.trim()
            .split('.')
            .map(|part| part.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()
    };
    match (parse(a), parse(b)) {
        (Some(mut x), Some(mut y)) => {
            let len = x.len().max(y.len());
            x.resize(len, 0);
            y.resize(len, 0);
            x.cmp(&y)
        }
        _ => a.cmp(b),
    }
}

/// Verify an events file and its trades file
pub fn verify_strict(events: &Path, trades: &Path, opts: &StrictOptions) -> Result<StrictReport> {
    let report = run(events, trades, opts)
        .inspect_err(|e| error!(events = %events.display(), "strict verification aborted: {e}"))?;
    info!(
        events = report.events_checked,
        trades = report.trades_checked,
        violations = report.violations.len(),
        "strict verification finished"
    );
    Ok(report)
}

fn run(events_path: &Path, trades_path: &Path, opts: &StrictOptions) -> Result<StrictReport> {
    let mut findings = Findings::default();

    let journal = match JournalFile::load(events_path) {
        Ok(journal) => Some(journal),
        Err(CodecError::Io { path, source }) => return Err(VerifyError::Io { path, source }),
        Err(other) => {
            findings.file(ViolationKind::FileFormat, format!("events missing meta/header: {other}"));
            None
        }
    };
    let trades = TradesFile::load(trades_path)?;

    let schema = journal
        .as_ref()
        .and_then(|j| j.meta.schema_version())
        .unwrap_or_default()
        .to_owned();
    if schema.is_empty() || compare_schema(&schema, &opts.minimum_schema) == Ordering::Less {
        findings.file(
            ViolationKind::SchemaVersion,
            format!("schema_version {schema} < required {}", opts.minimum_schema),
        );
    }

    let parsed = journal
        .as_ref()
        .map(|j| parse_events(j, &mut findings))
        .unwrap_or_default();
    debug!(parsed = parsed.len(), "events parsed");

    check_events(&parsed, opts, &mut findings);
    check_trades(&trades, journal.as_ref(), &parsed, &mut findings);

    let mut violations = findings.0;
    violations.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.kind.as_str().cmp(b.kind.as_str())));

    Ok(StrictReport {
        schema,
        events_checked: parsed.len(),
        trades_checked: trades.rows.len(),
        violations,
    })
}

fn parse_events(journal: &JournalFile, findings: &mut Findings) -> Vec<ParsedEvent> {
    let cols = match journal.columns() {
        Ok(cols) => cols,
        Err(e) => {
            findings.file(ViolationKind::FileFormat, e.to_string());
            return Vec::new();
        }
    };

    let mut parsed = Vec::with_capacity(journal.rows.len());
    let mut last_seq = 0_u64;
    let mut last_ts: Option<DateTime<Utc>> = None;

    for row in &journal.rows {
        let fields = &row.fields;
        if fields.len() != cols.width {
            findings.file(ViolationKind::RowFormat, format!("line {} malformed", row.line_no));
            continue;
        }
        let ts_raw = fields[cols.utc_ts].clone();
        let Ok(seq) = fields[cols.sequence].trim().parse::<u64>() else {
            findings.file(
                ViolationKind::SequenceParse,
                format!("line {} sequence invalid", row.line_no),
            );
            continue;
        };

        if seq <= last_seq {
            findings.push(
                ViolationKind::SequenceNonmonotonic,
                seq,
                None,
                Some(ts_raw.clone()),
                format!("non-increasing sequence after {last_seq}"),
            );
        } else {
            last_seq = seq;
        }

        match parse_utc(&ts_raw) {
            None => findings.push(
                ViolationKind::Timestamp,
                seq,
                None,
                Some(ts_raw.clone()),
                "invalid or non-UTC timestamp",
            ),
            Some(ts) if last_ts.is_some_and(|prev| ts < prev) => findings.push(
                ViolationKind::OrderViolation,
                seq,
                None,
                Some(ts_raw.clone()),
                "timestamp regression",
            ),
            Some(ts) => last_ts = Some(ts),
        }

        let raw_type = &fields[cols.event_type];
        let Ok(ty) = raw_type.parse::<EventType>() else {
            findings.push(ViolationKind::UnknownEvent, seq, None, Some(ts_raw), raw_type.clone());
            continue;
        };
        let Ok(payload) = serde_json::from_str::<Value>(&fields[cols.payload_json]) else {
            findings.push(ViolationKind::PayloadJson, seq, None, Some(ts_raw), "invalid JSON");
            continue;
        };
        parsed.push(ParsedEvent {
            seq,
            ts: ts_raw,
            ty,
            payload,
        });
    }
    parsed
}

/// Which event types may directly precede a rule-bound event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Predecessor {
    Bar,
    SentimentZ,
    ZOrClamp,
    BarSentimentOrEval,
    BarOrSentiment,
    EvalOrAlert,
}

impl Predecessor {
    fn of(ty: EventType) -> Option<Self> {
        match ty {
            EventType::SentimentZ => Some(Self::Bar),
            EventType::SentimentClamp => Some(Self::SentimentZ),
            EventType::SentimentApplied => Some(Self::ZOrClamp),
            EventType::PenaltyApplied => Some(Self::BarSentimentOrEval),
            EventType::RiskEval => Some(Self::BarOrSentiment),
            t if t.is_alert_block() => Some(Self::EvalOrAlert),
            _ => None,
        }
    }

    fn allows(self, prev: EventType) -> bool {
        match self {
            Self::Bar => prev == EventType::Bar,
            Self::SentimentZ => prev == EventType::SentimentZ,
            Self::ZOrClamp => matches!(prev, EventType::SentimentZ | EventType::SentimentClamp),
            Self::BarSentimentOrEval => {
                prev == EventType::Bar || prev == EventType::RiskEval || prev.is_sentiment()
            }
            Self::BarOrSentiment => prev == EventType::Bar || prev.is_sentiment(),
            Self::EvalOrAlert => prev == EventType::RiskEval || prev.is_alert_block(),
        }
    }

    const fn message(self) -> &'static str {
        match self {
            Self::Bar => "Z must immediately follow BAR",
            Self::SentimentZ => "CLAMP must follow Z",
            Self::ZOrClamp => "APPLIED must follow Z or CLAMP",
            Self::BarSentimentOrEval => "PENALTY must follow BAR, sentiment or RISK_EVAL",
            Self::BarOrSentiment => "RISK_EVAL must follow BAR or sentiment",
            Self::EvalOrAlert => "ALERT_BLOCK must follow RISK_EVAL or ALERT_BLOCK",
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum FieldKind {
    Text,
    Number,
}

fn required_fields(ty: EventType) -> &'static [(&'static str, FieldKind)] {
    use FieldKind::{Number, Text};
    match ty {
        EventType::SentimentApplied => &[
            ("symbol", Text),
            ("scaled_from", Number),
            ("scaled_to", Number),
            ("reason", Text),
        ],
        EventType::SentimentZ => &[("symbol", Text), ("z", Number)],
        EventType::SentimentClamp => &[("symbol", Text)],
        EventType::RiskEval => &[
            ("symbol", Text),
            ("ts", Text),
            ("net_exposure", Number),
            ("run_drawdown", Number),
        ],
        EventType::PenaltyApplied => &[("symbol", Text), ("penalty_scalar", Number)],
        _ => &[],
    }
}

fn short_tag(ty: EventType) -> &'static str {
    match ty {
        EventType::SentimentApplied => "APPLIED",
        EventType::SentimentZ => "Z",
        EventType::SentimentClamp => "CLAMP",
        EventType::RiskEval => "RISK_EVAL",
        EventType::PenaltyApplied => "PENALTY",
        other => other.as_str(),
    }
}

fn check_events(parsed: &[ParsedEvent], opts: &StrictOptions, findings: &mut Findings) {
    let mut group_start = 0;
    let abort_seq = parsed
        .iter()
        .find(|ev| ev.ty == EventType::DataQaAbort)
        .map(|ev| ev.seq);

    for (i, ev) in parsed.iter().enumerate() {
        if let Some(rule) = Predecessor::of(ev.ty) {
            let satisfied = if opts.lenient_order {
                parsed[group_start..i].iter().any(|p| rule.allows(p.ty))
            } else {
                i.checked_sub(1).is_some_and(|prev| rule.allows(parsed[prev].ty))
            };
            if !satisfied {
                findings.event(ViolationKind::OrderViolation, ev, rule.message());
            }
        }
        if ev.ty == EventType::Bar {
            group_start = i;
        }

        let missing: Vec<&str> = required_fields(ev.ty)
            .iter()
            .filter(|(name, kind)| {
                !ev.payload.get(*name).is_some_and(|v| match kind {
                    FieldKind::Text => v.is_string(),
                    FieldKind::Number => v.is_number(),
                })
            })
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            findings.event(
                ViolationKind::MissingField,
                ev,
                format!("{} missing required fields: {}", short_tag(ev.ty), missing.join(", ")),
            );
        }

        if ev.ty == EventType::SentimentApplied && opts.sentiment_mode == Some(FeatureMode::Shadow) {
            findings.event(ViolationKind::ModeViolation, ev, "APPLIED not allowed in shadow mode");
        }

        if let Some(path) = first_exponent_number(&ev.payload) {
            findings.event(ViolationKind::NumericFormat, ev, format!("scientific notation in {path}"));
        }
        if let Some(path) = first_comma_decimal(&ev.payload) {
            findings.event(ViolationKind::NumericFormat, ev, format!("comma decimal disallowed in {path}"));
        }

        if abort_seq.is_some_and(|abort| ev.seq > abort)
            && (ev.ty == EventType::Bar || ev.ty.is_sentiment())
        {
            findings.event(ViolationKind::OrderViolation, ev, "event after QA_ABORT");
        }
    }
}

fn check_trades(
    trades: &TradesFile,
    journal: Option<&JournalFile>,
    parsed: &[ParsedEvent],
    findings: &mut Findings,
) {
    let index = |name: &str| {
        trades
            .column(name)
            .or_else(|| TRADES_HEADER.iter().position(|h| *h == name))
            .unwrap_or_default()
    };
    let (open_idx, symbol_idx, volume_idx) = (index("utc_ts_open"), index("symbol"), index("volume_units"));
    let (schema_idx, hash_idx) = (index("schema_version"), index("config_hash"));

    let event_symbols: FxHashSet<String> = parsed
        .iter()
        .filter_map(|ev| symbol_of(&ev.payload))
        .filter(|s| !s.trim().is_empty())
        .map(str::to_ascii_lowercase)
        .collect();
    let meta_schema = journal.and_then(|j| j.meta.schema_version());
    let meta_hash = journal.and_then(|j| j.meta.config_hash());

    let mut trade_symbols: Vec<String> = Vec::new();
    let mut schema_reported = false;
    let mut hash_reported = false;

    for row in &trades.rows {
        let fields = &row.fields;
        if fields.len() < MIN_TRADE_FIELDS {
            findings.file(ViolationKind::TradeRow, format!("trade line {} malformed", row.line_no));
            continue;
        }
        let cell = |i: usize| fields.get(i).map_or("", |f| f.trim());
        let symbol = cell(symbol_idx).to_owned();
        let opened = cell(open_idx).to_owned();
        let trade_issue = |findings: &mut Findings, kind, detail: String| {
            findings.push(kind, 0, Some(symbol.clone()), Some(opened.clone()), detail);
        };

        for column in TRADE_DECIMAL_COLUMNS {
            let value = cell(index(column));
            if value.contains(['e', 'E']) {
                trade_issue(findings, ViolationKind::NumericFormat, format!("scientific notation in {column}"));
            } else if has_bad_numeric_format(value) {
                trade_issue(findings, ViolationKind::NumericFormat, format!("comma decimal disallowed in {column}"));
            }
        }
        if cell(volume_idx).parse::<i64>().is_err() {
            trade_issue(findings, ViolationKind::NumericFormat, "volume_units not integer".to_owned());
        }

        let stamped_schema = cell(schema_idx);
        if let Some(expected) = meta_schema.filter(|e| !schema_reported && *e != stamped_schema) {
            schema_reported = true;
            trade_issue(
                findings,
                ViolationKind::MetaMismatch,
                format!("trade schema_version {stamped_schema} != events {expected}"),
            );
        }
        let stamped_hash = cell(hash_idx);
        if let Some(expected) = meta_hash.filter(|e| !hash_reported && *e != stamped_hash) {
            hash_reported = true;
            trade_issue(
                findings,
                ViolationKind::MetaMismatch,
                format!("trade config_hash {stamped_hash} != events {expected}"),
            );
        }

        if !symbol.is_empty()
            && !trade_symbols.iter().any(|s| s.eq_ignore_ascii_case(&symbol))
        {
            trade_symbols.push(symbol);
        }
    }

    for symbol in trade_symbols {
        if !event_symbols.contains(&symbol.to_ascii_lowercase()) {
            findings.push(
                ViolationKind::SymbolSet,
                0,
                Some(symbol),
                None,
                "trade symbol missing from events",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_comparison() {
        assert_eq!(compare_schema("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_schema("1.3", "1.3.0"), Ordering::Equal);
        assert_eq!(compare_schema("1.2.9", "1.3.0"), Ordering::Less);
        assert_eq!(compare_schema("beta", "1.3.0"), Ordering::Greater);
    }

    #[test]
    fn test_kind_names_match_serde() {
        let kinds = [
            ViolationKind::SequenceNonmonotonic,
            ViolationKind::OrderViolation,
            ViolationKind::MetaMismatch,
        ];
        for kind in kinds {
            assert_eq!(
                serde_json::to_value(kind).ok(),
                Some(Value::String(kind.as_str().to_owned()))
            );
        }
    }

    #[test]
    fn test_predecessor_rules() {
        let z_rule = Predecessor::of(EventType::SentimentZ).unwrap();
        assert!(z_rule.allows(EventType::Bar));
        assert!(!z_rule.allows(EventType::RiskEval));
        let alert_rule = Predecessor::of(EventType::BlockNetExposure).unwrap();
        assert!(alert_rule.allows(EventType::RiskEval));
        assert!(alert_rule.allows(EventType::BlockDrawdown));
        assert!(Predecessor::of(EventType::ScaleToFit).is_none());
    }
}
