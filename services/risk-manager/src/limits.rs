//! Engine-level guardrails that sit outside order sizing

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;

/// UTC trading session; `start > end` wraps past midnight
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionWindow {
    /// Session open (inclusive)
    pub start_utc: NaiveTime,
    /// Session close (exclusive)
    pub end_utc: NaiveTime,
}

impl SessionWindow {
    /// Whether `ts` falls inside the session
    #[must_use]
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        let t = ts.time();
        if self.start_utc <= self.end_utc {
            t >= self.start_utc && t < self.end_utc
        } else {
            t >= self.start_utc || t < self.end_utc
        }
    }
}

/// What happens once a daily cap is hit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DailyCapAction {
    /// Stop opening positions
    #[default]
    Block,
    /// Halve new position sizes
    HalfSize,
}

/// Daily loss / gain thresholds in account currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCap {
    /// Loss threshold, a positive amount
    pub loss: Option<Decimal>,
    /// Gain threshold
    pub gain: Option<Decimal>,
    /// Action on breach
    pub action_on_breach: DailyCapAction,
}

/// Which side of a daily cap was crossed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyCapBreach {
    /// Realized loss reached the loss threshold
    Loss,
    /// Realized gain reached the gain threshold
    Gain,
}

impl DailyCap {
    /// Check the day's realized PnL against both thresholds
    #[must_use]
    pub fn evaluate(&self, daily_pnl: Decimal) -> Option<DailyCapBreach> {
        if self.loss.is_some_and(|loss| daily_pnl <= -loss.abs()) {
            return Some(DailyCapBreach::Loss);
        }
        if self.gain.is_some_and(|gain| daily_pnl >= gain) {
            return Some(DailyCapBreach::Gain);
        }
        None
    }
}

/// Run-wide drawdown limit in account currency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlobalDrawdown {
    /// Largest tolerated peak-to-trough loss
    pub max_dd: Decimal,
}

impl GlobalDrawdown {
    /// Breached once the drawdown strictly exceeds the limit
    #[must_use]
    pub fn is_breached(&self, drawdown: Decimal) -> bool {
        drawdown.abs() > self.max_dd.abs()
    }
}

/// Blackout around scheduled news events
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsBlackout {
    /// Master switch
    pub enabled: bool,
    /// Minutes blocked before each event
    pub minutes_before: i64,
    /// Minutes blocked after each event
    pub minutes_after: i64,
    /// Event calendar file
    pub source_path: Option<String>,
    /// Calendar refresh cadence
    pub poll_seconds: i64,
    /// `file` or `http`
    pub source_type: String,
}

impl Default for NewsBlackout {
    fn default() -> Self {
        Self {
            enabled: false,
            minutes_before: 0,
            minutes_after: 0,
            source_path: None,
            poll_seconds: 60,
            source_type: "file".to_owned(),
        }
    }
}

impl NewsBlackout {
    /// Whether `now` falls inside the window of any event
    #[must_use]
    pub fn is_blocked(&self, now: &DateTime<Utc>, events: &[DateTime<Utc>]) -> bool {
        if !self.enabled {
            return false;
        }
        let before = Duration::minutes(self.minutes_before);
        let after = Duration::minutes(self.minutes_after);
        events
            .iter()
            .any(|event| *now >= *event - before && *now <= *event + after)
    }
}
