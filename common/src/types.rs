//! Core identifiers and time helpers

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Journal schema version written by this workspace
pub const SCHEMA_VERSION: &str = "1.3.0";

/// Instrument identifier, e.g. `EURUSD`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstrumentId(String);

impl InstrumentId {
    /// Create a new instrument id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw id
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstrumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// ISO currency code
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a currency from a code; codes are upper-cased
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().to_ascii_uppercase())
    }

    /// US dollar, the default account currency
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_owned())
    }

    /// Borrow the code
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Currency {
    fn default() -> Self {
        Self::usd()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse an ISO-8601 timestamp that is explicitly UTC (`Z` suffix).
///
/// Offsets such as `+00:00` are rejected: journals must carry the `Z` form.
#[must_use]
pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if !raw.ends_with('Z') && !raw.ends_with('z') {
        return None;
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

/// Render a timestamp in the journal's `Z` form
#[must_use]
pub fn format_utc(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("2025-01-02T03:04:05Z", true)]
    #[case("2025-01-02T03:04:05.1234567Z", true)]
    #[case("2025-01-02T03:04:05+00:00", false)]
    #[case("2025-01-02T03:04:05", false)]
    #[case("not-a-time", false)]
    fn test_parse_utc(#[case] raw: &str, #[case] ok: bool) {
        assert_eq!(parse_utc(raw).is_some(), ok);
    }

    #[test]
    fn test_format_roundtrip() {
        let ts = parse_utc("2025-01-02T03:04:05Z").unwrap();
        assert_eq!(format_utc(&ts), "2025-01-02T03:04:05Z");
    }

    #[test]
    fn test_currency_uppercases() {
        assert_eq!(Currency::new("eur").as_str(), "EUR");
        assert_eq!(Currency::default(), Currency::usd());
    }
}
