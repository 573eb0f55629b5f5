//! Closed vocabulary of journal event types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! event_types {
    ($($variant:ident => $tag:literal),+ $(,)?) => {
        /// Every event type a journal may carry
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum EventType {
            $(
                #[doc = concat!("`", $tag, "`")]
                #[serde(rename = $tag)]
                $variant,
            )+
        }

        impl EventType {
            /// All known event types
            pub const ALL: &'static [Self] = &[$(Self::$variant),+];

            /// Wire tag written to the `event_type` column
            #[must_use]
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $tag,)+
                }
            }
        }

        impl FromStr for EventType {
            type Err = UnknownEventType;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok(Self::$variant),)+
                    other => Err(UnknownEventType(other.to_owned())),
                }
            }
        }
    };
}

event_types! {
    Bar => "BAR_V1",
    RiskProbe => "RISK_PROBE_V1",
    SentimentZ => "INFO_SENTIMENT_Z_V1",
    SentimentClamp => "INFO_SENTIMENT_CLAMP_V1",
    SentimentApplied => "INFO_SENTIMENT_APPLIED_V1",
    DataQaBegin => "DATA_QA_BEGIN_V1",
    DataQaIssue => "DATA_QA_ISSUE_V1",
    DataQaSummary => "DATA_QA_SUMMARY_V1",
    DataQaAbort => "DATA_QA_ABORT_V1",
    RiskEval => "INFO_RISK_EVAL_V1",
    PenaltyApplied => "PENALTY_APPLIED_V1",
    ScaleToFit => "INFO_SCALE_TO_FIT",
    BlockLeverage => "ALERT_BLOCK_LEVERAGE",
    BlockMargin => "ALERT_BLOCK_MARGIN",
    BlockRiskCap => "ALERT_BLOCK_RISK_CAP",
    BlockBasket => "ALERT_BLOCK_BASKET",
    BlockNetExposure => "ALERT_BLOCK_NET_EXPOSURE",
    BlockDrawdown => "ALERT_BLOCK_DRAWDOWN",
    BlockGlobalDrawdown => "ALERT_BLOCK_GLOBAL_DRAWDOWN",
    BlockSessionWindow => "ALERT_BLOCK_SESSION_WINDOW",
    BlockNewsBlackout => "ALERT_BLOCK_NEWS_BLACKOUT",
    BlockDailyLossCap => "ALERT_BLOCK_DAILY_LOSS_CAP",
    BlockDailyGainCap => "ALERT_BLOCK_DAILY_GAIN_CAP",
    ThrottleDailyGainCap => "ALERT_THROTTLE_DAILY_GAIN_CAP",
}

/// Prefix shared by every blocking alert
pub const ALERT_BLOCK_PREFIX: &str = "ALERT_BLOCK_";

/// Prefix shared by every sentiment event
pub const SENTIMENT_PREFIX: &str = "INFO_SENTIMENT_";

/// Returned when a tag is not part of the closed set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl EventType {
    /// Blocking alert (`ALERT_BLOCK_*`)
    #[must_use]
    pub fn is_alert_block(self) -> bool {
        self.as_str().starts_with(ALERT_BLOCK_PREFIX)
    }

    /// Sentiment event (`INFO_SENTIMENT_*`)
    #[must_use]
    pub fn is_sentiment(self) -> bool {
        self.as_str().starts_with(SENTIMENT_PREFIX)
    }

    /// Events emitted by the risk enforcer and risk rails
    #[must_use]
    pub fn is_risk_alert(self) -> bool {
        self.is_alert_block() || matches!(self, Self::ScaleToFit | Self::ThrottleDailyGainCap)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
