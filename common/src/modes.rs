//! Feature-flag modes read from the engine configuration

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Operating mode of an optional engine feature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureMode {
    /// Feature disabled
    #[default]
    Off,
    /// Observe and journal, never alter sizing
    Shadow,
    /// Observe and enforce
    Active,
}

/// Risk feature mode; same vocabulary as every other feature flag
pub type RiskMode = FeatureMode;

impl FeatureMode {
    /// Map a raw flag value. Unrecognised spellings fall back to `Off`.
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "shadow" | "monitor" => Self::Shadow,
            "active" | "enforce" => Self::Active,
            _ => Self::Off,
        }
    }

    /// Read a mode from a `featureFlags` object, trying each key in order.
    ///
    /// Missing flags, non-string values and a missing object all yield `Off`.
    #[must_use]
    pub fn from_flags(feature_flags: Option<&Value>, keys: &[&str]) -> Self {
        let Some(Value::Object(flags)) = feature_flags else {
            return Self::Off;
        };
        keys.iter()
            .find_map(|key| flags.get(*key).and_then(Value::as_str))
            .map_or(Self::Off, Self::parse_lenient)
    }

    /// Risk mode: `featureFlags.risk`, falling back to `featureFlags.riskMode`
    #[must_use]
    pub fn risk_from_config(config: &Value) -> Self {
        Self::from_flags(config.get("featureFlags"), &["risk", "riskMode"])
    }

    /// Sentiment mode: `featureFlags.sentiment`
    #[must_use]
    pub fn sentiment_from_config(config: &Value) -> Self {
        Self::from_flags(config.get("featureFlags"), &["sentiment"])
    }

    /// Penalty mode: `featureFlags.penalty`
    #[must_use]
    pub fn penalty_from_config(config: &Value) -> Self {
        Self::from_flags(config.get("featureFlags"), &["penalty"])
    }

    /// Lower-case wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Shadow => "shadow",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for FeatureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
