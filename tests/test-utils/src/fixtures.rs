//! rstest fixtures for journals and configuration documents

use crate::factories::{JournalBuilder, T0, TradesBuilder, bar_payload, sentiment_z_payload};
use rstest::fixture;
use serde_json::{Value, json};
use std::path::PathBuf;
use tempfile::TempDir;

/// A journal pair on disk. The directory lives as long as the fixture.
#[derive(Debug)]
pub struct JournalFixture {
    /// Owning temp directory
    pub dir: TempDir,
    /// `events.csv`
    pub events: PathBuf,
    /// `trades.csv`
    pub trades: PathBuf,
}

impl JournalFixture {
    /// Write a journal pair into a fresh temp directory
    pub fn create(events: &JournalBuilder, trades: &TradesBuilder) -> anyhow::Result<Self> {
        let dir = TempDir::new()?;
        let events = events.write(dir.path(), "events.csv")?;
        let trades = trades.write(dir.path(), "trades.csv")?;
        Ok(Self { dir, events, trades })
    }

    /// Append raw lines to the events file
    pub fn append_events(&self, lines: &[&str]) -> anyhow::Result<()> {
        let mut text = std::fs::read_to_string(&self.events)?;
        for line in lines {
            text.push_str(line);
            text.push('\n');
        }
        std::fs::write(&self.events, text)?;
        Ok(())
    }
}

/// BAR followed by its sentiment Z score
pub fn healthy_events() -> JournalBuilder {
    JournalBuilder::new()
        .event(T0, "BAR_V1", bar_payload("EURUSD", 60, T0, "2025-01-01T00:01:00Z"))
        .event(T0, "INFO_SENTIMENT_Z_V1", sentiment_z_payload("EURUSD"))
}

/// One EURUSD trade
pub fn healthy_trades() -> TradesBuilder {
    TradesBuilder::new().trade("EURUSD", "0.20", "100")
}

/// Journal pair that passes every verifier
#[fixture]
pub fn healthy_journal() -> JournalFixture {
    JournalFixture::create(&healthy_events(), &healthy_trades())
        .unwrap_or_else(|e| panic!("failed to write healthy journal: {e}"))
}

/// Fresh temp directory
#[fixture]
pub fn temp_dir() -> TempDir {
    TempDir::new().unwrap_or_else(|e| panic!("failed to create temp dir: {e}"))
}

/// Engine configuration with risk enforcement active
#[fixture]
pub fn engine_config() -> Value {
    json!({
        "schemaVersion": "1.3.0",
        "name": "fixture",
        "equity": 100000,
        "featureFlags": { "risk": "active", "sentiment": "shadow", "penalty": "off" },
        "riskConfig": {
            "real_leverage_cap": 20,
            "margin_usage_cap_pct": 80,
            "per_position_risk_cap_pct": 1,
            "enable_scale_to_fit": true,
            "lot_step": 0.01
        },
        "sentimentConfig": { "window": 5, "volGuard": 1.5 }
    })
}
