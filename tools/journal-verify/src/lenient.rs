//! Lenient journal verification
//!
//! Checks the envelope, then each row's timestamp and payload. `BAR_V1` rows
//! are checked for shape, ordering and duplicate keys; `RISK_PROBE_V1` rows
//! for their numeric metrics; enforcer alerts for their identifiers. Issues
//! are collected up to a cap. Broken file structure aborts the run.

use crate::error::{Result, VerifyError};
use crate::payload::{field_text, lookup_ci};
use common::{EventType, SCHEMA_VERSION, parse_utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use storage::tracker::composite_key;
use storage::{BarKeyTracker, JournalFile};
use tracing::{debug, error, info};

/// Default issue cap
pub const DEFAULT_MAX_ERRORS: usize = 100;

/// Key used for envelope issues
pub const META_KEY: &str = "<meta>";

const BAR_FIELDS: [&str; 9] = [
    "InstrumentId.Value",
    "IntervalSeconds",
    "StartUtc",
    "EndUtc",
    "Open",
    "High",
    "Low",
    "Close",
    "Volume",
];

const RISK_METRICS: [&str; 3] = ["ProjectedLeverage", "ProjectedMarginUsagePct", "BasketRiskPct"];

/// Lenient run settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LenientOptions {
    /// Schema version the meta line must carry
    pub expected_schema: String,
    /// Stop collecting after this many issues
    pub max_errors: usize,
    /// Report repeated bar composite keys
    pub report_duplicates: bool,
}

impl Default for LenientOptions {
    fn default() -> Self {
        Self {
            expected_schema: SCHEMA_VERSION.to_owned(),
            max_errors: DEFAULT_MAX_ERRORS,
            report_duplicates: false,
        }
    }
}

/// One accumulated problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalIssue {
    /// Where: `<meta>`, `line:N`, `BAR:inst:start`, a composite key, ...
    pub key: String,
    /// What
    pub reason: String,
}

/// Outcome of a lenient run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LenientReport {
    /// No issues
    pub ok: bool,
    /// Number of collected issues
    pub error_count: usize,
    /// Collected issues in file order
    pub errors: Vec<JournalIssue>,
    #[serde(skip)]
    max_errors: usize,
}

impl LenientReport {
    /// Whether the journal passed
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.ok
    }

    /// 0 when clean, 1 otherwise
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.ok {
            crate::error::EXIT_OK
        } else {
            crate::error::EXIT_FATAL
        }
    }

    /// Multi-line text for terminals
    #[must_use]
    pub fn human_summary(&self) -> String {
        if self.ok {
            return "OK: journal verification passed".to_owned();
        }
        let mut out = format!(
            "VERIFICATION FAILED: {} issue(s) (showing up to {})",
            self.error_count, self.max_errors
        );
        for issue in &self.errors {
            out.push_str(&format!("\n - {}: {}", issue.key, issue.reason));
        }
        out
    }

    /// Indented JSON document
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| VerifyError::Structural(e.to_string()))
    }

    /// `Err(Violations)` unless clean
    pub fn into_result(self) -> Result<Self> {
        if self.ok {
            Ok(self)
        } else {
            Err(VerifyError::Violations {
                count: self.error_count,
                exit_code: self.exit_code(),
            })
        }
    }
}

#[derive(Debug)]
struct Issues {
    list: Vec<JournalIssue>,
    cap: usize,
}

impl Issues {
    const fn new(cap: usize) -> Self {
        Self {
            list: Vec::new(),
            cap,
        }
    }

    fn push(&mut self, key: impl Into<String>, reason: impl Into<String>) {
        if self.list.len() < self.cap {
            self.list.push(JournalIssue {
                key: key.into(),
                reason: reason.into(),
            });
        }
    }

    fn is_full(&self) -> bool {
        self.list.len() >= self.cap
    }
}

/// Verify one events file
pub fn verify_journal(path: &Path, opts: &LenientOptions) -> Result<LenientReport> {
    let report = run(path, opts).inspect_err(|e| error!(path = %path.display(), "journal verification aborted: {e}"))?;
    info!(
        path = %path.display(),
        issues = report.error_count,
        "journal verification finished"
    );
    Ok(report)
}

fn run(path: &Path, opts: &LenientOptions) -> Result<LenientReport> {
    let journal = JournalFile::load(path)?;
    let mut issues = Issues::new(opts.max_errors);

    match journal.meta.schema_version() {
        None => issues.push(META_KEY, "schema_version missing"),
        Some(v) if v != opts.expected_schema => issues.push(
            META_KEY,
            format!("schema_version mismatch expected {} got {v}", opts.expected_schema),
        ),
        Some(_) => {}
    }
    if journal.meta.config_hash().is_none() {
        issues.push(META_KEY, "config_hash missing");
    }

    let cols = journal.columns()?;
    let mut tracker = BarKeyTracker::new();

    for row in &journal.rows {
        let fields = &row.fields;
        if fields.len() != cols.width {
            return Err(VerifyError::Structural(format!(
                "Column count mismatch line {}: expected {}, found {}",
                row.line_no,
                cols.width,
                fields.len()
            )));
        }
        if issues.is_full() {
            continue;
        }

        let line_key = format!("line:{}", row.line_no);
        let ts = fields[cols.utc_ts].as_str();
        if parse_utc(ts).is_none() {
            issues.push(line_key.as_str(), "utc_ts not valid ISO-8601 UTC");
        }
        let Ok(payload) = serde_json::from_str::<Value>(&fields[cols.payload_json]) else {
            issues.push(line_key, "payload_json not valid JSON");
            continue;
        };

        let raw_type = fields[cols.event_type].as_str();
        match raw_type.parse::<EventType>() {
            Ok(EventType::Bar) => check_bar(&payload, &mut tracker, opts, &mut issues),
            Ok(EventType::RiskProbe) => check_risk_probe(&payload, ts, &mut issues),
            Ok(
                ty @ (EventType::BlockLeverage
                | EventType::BlockMargin
                | EventType::BlockRiskCap
                | EventType::BlockBasket
                | EventType::ScaleToFit),
            ) => check_enforcer_alert(ty, &payload, ts, &mut issues),
            Ok(_) => {}
            Err(_) => issues.push(line_key, format!("unsupported event_type {raw_type}")),
        }
    }

    debug!(bars = tracker.len(), "distinct bar keys");
    let errors = issues.list;
    Ok(LenientReport {
        ok: errors.is_empty(),
        error_count: errors.len(),
        errors,
        max_errors: opts.max_errors,
    })
}

fn check_bar(payload: &Value, tracker: &mut BarKeyTracker, opts: &LenientOptions, issues: &mut Issues) {
    let instrument = field_text(payload, "InstrumentId.Value");
    let start_raw = field_text(payload, "StartUtc");
    let key = format!(
        "BAR:{}:{}",
        instrument.as_deref().unwrap_or("?"),
        start_raw.as_deref().unwrap_or("?")
    );
    if BAR_FIELDS
        .iter()
        .any(|f| lookup_ci(payload, f).is_none_or(Value::is_null))
    {
        issues.push(key, "missing required bar fields");
        return;
    }
    let (Some(instrument), Some(start_raw)) = (instrument, start_raw) else {
        return;
    };

    let interval = lookup_ci(payload, "IntervalSeconds")
        .and_then(Value::as_i64)
        .filter(|secs| *secs > 0);
    if interval.is_none() {
        issues.push(key.as_str(), "invalid intervalSeconds");
    }
    let end = field_text(payload, "EndUtc").and_then(|raw| parse_utc(&raw));
    let (Some(start), Some(end)) = (parse_utc(&start_raw), end) else {
        issues.push(key, "start/end not valid UTC");
        return;
    };
    if start >= end {
        issues.push(key.as_str(), "startUtc >= endUtc");
    }
    let interval = interval.unwrap_or_default();
    let observation = tracker.observe(&instrument, interval, start);
    let composite = composite_key(&instrument, interval, &start);
    if observation.duplicate && opts.report_duplicates {
        issues.push(composite.as_str(), "duplicate composite key");
    }
    if observation.non_monotonic {
        issues.push(composite, "non-monotonic startUtc");
    }
}

fn check_risk_probe(payload: &Value, ts: &str, issues: &mut Issues) {
    let instrument =
        field_text(payload, "InstrumentId.Value").or_else(|| field_text(payload, "InstrumentId"));
    let key = format!("RISK:{}:{ts}", instrument.as_deref().unwrap_or("?"));
    let metrics: Vec<_> = RISK_METRICS
        .iter()
        .map(|name| (*name, field_text(payload, name)))
        .collect();
    if instrument.is_none() || metrics.iter().any(|(_, v)| v.is_none()) {
        issues.push(key, "missing required risk fields");
        return;
    }
    for (name, raw) in metrics {
        let numeric = raw.as_deref().is_some_and(|r| {
            r.parse::<Decimal>().is_ok() || Decimal::from_scientific(r).is_ok()
        });
        if !numeric {
            issues.push(key.as_str(), format!("{name} not number"));
        }
    }
}

fn check_enforcer_alert(ty: EventType, payload: &Value, ts: &str, issues: &mut Issues) {
    let present = |name: &str| {
        field_text(payload, name).is_some_and(|v| !v.trim().is_empty())
    };
    let has_instrument = present("InstrumentId") || present("InstrumentId.Value");
    if !has_instrument || !present("DecisionId") {
        issues.push(format!("{ty}:{ts}"), "missing InstrumentId or DecisionId");
    }
}
