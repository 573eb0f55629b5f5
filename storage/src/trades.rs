//! Trades file: one closed trade per row

use crate::error::{CodecError, Result};
use crate::rows::{self, RawRow};
use chrono::{DateTime, Utc};
use common::{InstrumentId, format_utc};
use rust_decimal::Decimal;
use std::fmt;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

/// Trades header written by [`TradesWriter`]
pub const TRADES_HEADER: [&str; 14] = [
    "utc_ts_open",
    "utc_ts_close",
    "symbol",
    "direction",
    "entry_price",
    "exit_price",
    "volume_units",
    "pnl_ccy",
    "pnl_r",
    "decision_id",
    "schema_version",
    "config_hash",
    "data_version",
    "src_adapter",
];

/// Trade side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Long
    Buy,
    /// Short
    Sell,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Buy => "Buy",
            Self::Sell => "Sell",
        })
    }
}

/// A closed trade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRow {
    /// Entry time
    pub utc_ts_open: DateTime<Utc>,
    /// Exit time
    pub utc_ts_close: DateTime<Utc>,
    /// Instrument
    pub symbol: InstrumentId,
    /// Side
    pub direction: Direction,
    /// Entry price
    pub entry_price: Decimal,
    /// Exit price
    pub exit_price: Decimal,
    /// Units traded, always integral
    pub volume_units: i64,
    /// Realized PnL in account currency
    pub pnl_ccy: Decimal,
    /// PnL in risk multiples
    pub pnl_r: Decimal,
    /// Decision that opened the trade
    pub decision_id: String,
}

/// Run-level columns stamped on every trade row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TradeStamp {
    /// Schema version
    pub schema_version: String,
    /// Config hash
    pub config_hash: String,
    /// Data version
    pub data_version: String,
    /// Source adapter id
    pub src_adapter: String,
}

/// Append-only trades writer
pub struct TradesWriter {
    path: PathBuf,
    out: csv::Writer<File>,
    stamp: TradeStamp,
}

impl TradesWriter {
    /// Create (or truncate) a trades file and write its header
    pub fn create(path: &Path, stamp: TradeStamp) -> Result<Self> {
        let file = File::create(path).map_err(CodecError::io(path))?;
        let mut out = rows::writer(file);
        out.write_record(TRADES_HEADER)?;
        info!("Opened trades file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            out,
            stamp,
        })
    }

    /// Append a trade. Decimals are written in plain notation.
    pub fn append(&mut self, trade: &TradeRow) -> Result<()> {
        self.out.write_record([
            format_utc(&trade.utc_ts_open),
            format_utc(&trade.utc_ts_close),
            trade.symbol.to_string(),
            trade.direction.to_string(),
            trade.entry_price.to_string(),
            trade.exit_price.to_string(),
            trade.volume_units.to_string(),
            trade.pnl_ccy.to_string(),
            trade.pnl_r.to_string(),
            trade.decision_id.clone(),
            self.stamp.schema_version.clone(),
            self.stamp.config_hash.clone(),
            self.stamp.data_version.clone(),
            self.stamp.src_adapter.clone(),
        ])?;
        Ok(())
    }

    /// Flush buffered rows
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(CodecError::io(&self.path))
    }
}

/// A fully materialized trades file
#[derive(Debug, Clone)]
pub struct TradesFile {
    /// Source path
    pub path: PathBuf,
    /// Header column names
    pub header: Vec<String>,
    /// Data rows
    pub rows: Vec<RawRow>,
}

impl TradesFile {
    /// Read a trades file. An empty file yields no header and no rows.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(CodecError::io(path))?;
        let mut records = rows::read_rows(rows::strip_bom(&text), 1)?.into_iter();
        let header = records
            .next()
            .map(|row| row.fields.iter().map(|h| h.trim().to_owned()).collect())
            .unwrap_or_default();
        let rows = records.collect();
        Ok(Self {
            path: path.to_path_buf(),
            header,
            rows,
        })
    }

    /// Index of a named column
    #[must_use]
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    /// Sum of the `pnl_ccy` column; unparseable cells count as zero
    #[must_use]
    pub fn total_pnl(&self) -> Decimal {
        self.pnl_series().into_iter().sum()
    }

    /// `pnl_ccy` per row in file order; unparseable cells count as zero
    #[must_use]
    pub fn pnl_series(&self) -> Vec<Decimal> {
        let Some(idx) = self.column("pnl_ccy") else {
            return Vec::new();
        };
        self.rows
            .iter()
            .map(|row| {
                row.fields
                    .get(idx)
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or_default()
            })
            .collect()
    }
}
