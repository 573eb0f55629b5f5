//! Facts gathered from one finished run

use crate::error::Result;
use common::EventType;
use journal_verify::parity::{hash_lines, normalize_events, normalize_trades};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::path::Path;
use storage::{JournalFile, RecordedEvent, TradesFile, canonicalize_json_text};
use tracing::debug;

/// Serialize a decimal as a bare JSON number
pub(crate) fn decimal_as_number<S: Serializer>(
    value: &Decimal,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serde_json::from_str::<Value>(&value.to_string())
        .map_err(serde::ser::Error::custom)?
        .serialize(serializer)
}

/// Data-QA outcome of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DataQaFacts {
    /// A `DATA_QA_ABORT_V1` event was written, or the summary says so
    pub aborted: bool,
    /// The `DATA_QA_SUMMARY_V1` verdict; true when QA did not run
    pub passed: bool,
}

impl DataQaFacts {
    /// QA aborted the run or reported failure
    #[must_use]
    pub const fn failed(&self) -> bool {
        self.aborted || !self.passed
    }
}

impl Default for DataQaFacts {
    fn default() -> Self {
        Self {
            aborted: false,
            passed: true,
        }
    }
}

/// Parity hashes of a run's outputs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunHashes {
    /// Events without the meta line
    pub events: String,
    /// Trades with `config_hash` blanked
    pub trades: String,
}

/// Summary numbers for one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunFacts {
    /// Engine exit code
    pub exit_code: Option<i32>,
    /// Realised PnL, account currency
    #[serde(serialize_with = "decimal_as_number")]
    pub pnl: Decimal,
    /// Largest peak-to-trough fall of cumulative PnL
    #[serde(serialize_with = "decimal_as_number")]
    pub max_dd: Decimal,
    /// Closed trades
    pub trades: usize,
    /// Event rows
    pub events: usize,
    /// `ALERT_BLOCK_*` rows
    pub alerts: usize,
    /// `INFO_SENTIMENT_APPLIED_V1` rows
    pub sentiment_applied: usize,
    /// `PENALTY_APPLIED_V1` rows
    pub penalty_applied: usize,
    /// Parity hashes
    pub hashes: RunHashes,
}

/// Facts plus the event lines the parity rules compare
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunAnalysis {
    /// Reported facts
    pub facts: RunFacts,
    /// QA outcome
    pub data_qa: DataQaFacts,
    /// `type|payload` of every blocking alert, in journal order
    pub alert_lines: Vec<String>,
    /// `type|payload` of every sentiment event, in journal order
    pub sentiment_lines: Vec<String>,
    /// Sequence numbers of `PENALTY_APPLIED_V1` rows
    pub penalty_seqs: Vec<u64>,
}

/// Largest drop from a running peak of cumulative PnL; the peak starts at zero
#[must_use]
pub fn max_drawdown(pnl_series: &[Decimal]) -> Decimal {
    let mut equity = Decimal::ZERO;
    let mut peak = Decimal::ZERO;
    let mut worst = Decimal::ZERO;
    for pnl in pnl_series {
        equity += *pnl;
        peak = peak.max(equity);
        worst = worst.max(peak - equity);
    }
    worst
}

fn event_line(ev: &RecordedEvent) -> String {
    let payload = canonicalize_json_text(&ev.payload).unwrap_or_else(|_| ev.payload.clone());
    format!("{}|{payload}", ev.event_type)
}

fn qa_summary(ev: &RecordedEvent, qa: &mut DataQaFacts) {
    let Ok(payload) = serde_json::from_str::<Value>(&ev.payload) else {
        return;
    };
    if let Some(passed) = payload.get("passed").and_then(Value::as_bool) {
        qa.passed = passed;
    }
    if payload.get("aborted").and_then(Value::as_bool) == Some(true) {
        qa.aborted = true;
    }
}

/// Read a finished run's journal pair
pub fn analyze_run(events_path: &Path, trades_path: &Path, exit_code: Option<i32>) -> Result<RunAnalysis> {
    let journal = JournalFile::load(events_path)?;
    let events = journal.events()?;
    let trades = TradesFile::load(trades_path)?;

    let mut analysis = RunAnalysis::default();
    for ev in &events {
        let Ok(ty) = ev.event_type.parse::<EventType>() else {
            continue;
        };
        match ty {
            t if t.is_alert_block() => analysis.alert_lines.push(event_line(ev)),
            t if t.is_sentiment() => {
                if t == EventType::SentimentApplied {
                    analysis.facts.sentiment_applied += 1;
                }
                analysis.sentiment_lines.push(event_line(ev));
            }
            EventType::PenaltyApplied => analysis.penalty_seqs.push(ev.sequence),
            EventType::DataQaAbort => analysis.data_qa.aborted = true,
            EventType::DataQaSummary => qa_summary(ev, &mut analysis.data_qa),
            _ => {}
        }
    }

    let series = trades.pnl_series();
    analysis.facts = RunFacts {
        exit_code,
        pnl: trades
            .total_pnl()
            .round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero),
        max_dd: max_drawdown(&series).round_dp_with_strategy(6, RoundingStrategy::MidpointAwayFromZero),
        trades: trades.rows.len(),
        events: events.len(),
        alerts: analysis.alert_lines.len(),
        penalty_applied: analysis.penalty_seqs.len(),
        hashes: RunHashes {
            events: hash_lines(&normalize_events(events_path)?),
            trades: hash_lines(&normalize_trades(trades_path)?),
        },
        ..analysis.facts
    };
    debug!(
        schema = ?journal.meta.schema_version(),
        events = analysis.facts.events,
        trades = analysis.facts.trades,
        "run analysed"
    );
    Ok(analysis)
}
