//! Builders for journal and trades files

use anyhow::Result;
use common::SCHEMA_VERSION;
use serde_json::{Value, json};
use std::fs;
use std::path::{Path, PathBuf};
use storage::rows;
use storage::{EVENTS_HEADER, JournalMeta, TRADES_HEADER, canonical_json};

/// Default config hash stamped by the builders
pub const TEST_CONFIG_HASH: &str = "ABC123";

/// Timestamp used by fixtures unless a test picks its own
pub const T0: &str = "2025-01-01T00:00:00Z";

fn csv_row<I, S>(fields: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    rows::join_row(fields).unwrap_or_else(|e| panic!("failed to encode fixture row: {e}"))
}

/// Builds an events file line by line.
///
/// Rows get consecutive sequence numbers unless written with
/// [`JournalBuilder::event_with_seq`] or [`JournalBuilder::raw_line`].
#[derive(Debug, Clone)]
pub struct JournalBuilder {
    meta: JournalMeta,
    legacy_header: bool,
    rows: Vec<String>,
    next_seq: u64,
}

impl Default for JournalBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JournalBuilder {
    /// Five-column journal stamped with the current schema and [`TEST_CONFIG_HASH`]
    pub fn new() -> Self {
        Self {
            meta: JournalMeta::new(SCHEMA_VERSION, TEST_CONFIG_HASH)
                .with("adapter_id", "stub")
                .with("broker", "stub")
                .with("account_id", "acct-1"),
            legacy_header: false,
            rows: Vec::new(),
            next_seq: 1,
        }
    }

    /// Replace the meta line
    pub fn meta(mut self, meta: JournalMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Use the four-column header without `src_adapter`
    pub fn legacy_header(mut self) -> Self {
        self.legacy_header = true;
        self
    }

    /// Append an event with the next sequence number
    pub fn event(self, ts: &str, event_type: &str, payload: Value) -> Self {
        let seq = self.next_seq;
        self.event_with_seq(seq, ts, event_type, payload)
    }

    /// Append an event with an explicit sequence number
    pub fn event_with_seq(mut self, seq: u64, ts: &str, event_type: &str, payload: Value) -> Self {
        let mut fields = vec![seq.to_string(), ts.to_owned(), event_type.to_owned()];
        if !self.legacy_header {
            fields.push("stub".to_owned());
        }
        fields.push(canonical_json(&payload));
        self.rows.push(csv_row(fields));
        self.next_seq = seq + 1;
        self
    }

    /// Append a line verbatim
    pub fn raw_line(mut self, line: &str) -> Self {
        self.rows.push(line.to_owned());
        self
    }

    /// File contents
    pub fn render(&self) -> String {
        let header: Vec<&str> = EVENTS_HEADER
            .iter()
            .copied()
            .filter(|c| !self.legacy_header || *c != "src_adapter")
            .collect();
        let mut out = format!("{}\n{}\n", self.meta, header.join(","));
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    /// Write to `dir/name` and return the path
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, self.render())?;
        Ok(path)
    }
}

/// Builds a trades file
#[derive(Debug, Clone)]
pub struct TradesBuilder {
    schema_version: String,
    config_hash: String,
    rows: Vec<String>,
}

impl Default for TradesBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TradesBuilder {
    /// Rows stamped with the current schema and [`TEST_CONFIG_HASH`]
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_owned(),
            config_hash: TEST_CONFIG_HASH.to_owned(),
            rows: Vec::new(),
        }
    }

    /// Stamp later rows with a different config hash
    pub fn config_hash(mut self, hash: &str) -> Self {
        self.config_hash = hash.to_owned();
        self
    }

    /// Append a closed trade; `pnl` and `volume` are written verbatim
    pub fn trade(mut self, symbol: &str, pnl: &str, volume: &str) -> Self {
        let row = csv_row([
            T0,
            "2025-01-01T01:00:00Z",
            symbol,
            "BUY",
            "1.1000",
            "1.1002",
            volume,
            pnl,
            "0",
            "DEC1",
            self.schema_version.as_str(),
            self.config_hash.as_str(),
            "",
            "stub",
        ]);
        self.rows.push(row);
        self
    }

    /// Append a line verbatim
    pub fn raw_line(mut self, line: &str) -> Self {
        self.rows.push(line.to_owned());
        self
    }

    /// File contents
    pub fn render(&self) -> String {
        let mut out = TRADES_HEADER.join(",");
        out.push('\n');
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }

    /// Write to `dir/name` and return the path
    pub fn write(&self, dir: &Path, name: &str) -> Result<PathBuf> {
        let path = dir.join(name);
        fs::write(&path, self.render())?;
        Ok(path)
    }
}

/// `BAR_V1` payload
pub fn bar_payload(instrument: &str, interval_secs: i64, start: &str, end: &str) -> Value {
    json!({
        "InstrumentId": { "Value": instrument },
        "IntervalSeconds": interval_secs,
        "StartUtc": start,
        "EndUtc": end,
        "Open": 1.1,
        "High": 1.1005,
        "Low": 1.0995,
        "Close": 1.1002,
        "Volume": 10
    })
}

/// `RISK_PROBE_V1` payload
pub fn risk_probe_payload(instrument: &str) -> Value {
    json!({
        "InstrumentId": { "Value": instrument },
        "ProjectedLeverage": 1.5,
        "ProjectedMarginUsagePct": 12.5,
        "BasketRiskPct": 0.8
    })
}

/// `INFO_SENTIMENT_Z_V1` payload
pub fn sentiment_z_payload(symbol: &str) -> Value {
    json!({ "symbol": symbol, "z": 0.0, "window": 5, "sigma": 0.1 })
}

/// `INFO_SENTIMENT_CLAMP_V1` payload
pub fn sentiment_clamp_payload(symbol: &str) -> Value {
    json!({ "symbol": symbol, "z": 2.5, "clamped_to": 2.0 })
}

/// `INFO_SENTIMENT_APPLIED_V1` payload
pub fn sentiment_applied_payload(symbol: &str, from: i64, to: i64) -> Value {
    json!({ "symbol": symbol, "scaled_from": from, "scaled_to": to, "reason": "sentiment_clamp" })
}

/// `INFO_RISK_EVAL_V1` payload
pub fn risk_eval_payload(symbol: &str, ts: &str, net_exposure: i64) -> Value {
    json!({ "symbol": symbol, "ts": ts, "net_exposure": net_exposure, "run_drawdown": 0 })
}

/// `PENALTY_APPLIED_V1` payload
pub fn penalty_payload(symbol: &str) -> Value {
    json!({ "symbol": symbol, "penalty_scalar": 0.5, "reason": "forced" })
}

/// `ALERT_BLOCK_*` payload in the risk-guardrail shape
pub fn guardrail_alert_payload(symbol: &str) -> Value {
    json!({ "symbol": symbol, "limit": 100, "value": 200, "reason": "cap" })
}

/// Payload for any `DATA_QA_*` event
pub fn data_qa_payload(detail: &str) -> Value {
    json!({ "detail": detail })
}
