//! Basket risk aggregation

use crate::formulas::{round6, safe_div};
use common::{Currency, InstrumentId};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use std::fmt;

/// Bucket used for instruments missing from the bucket map
pub const DEFAULT_BUCKET: &str = "__default__";

/// How open positions are grouped into baskets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum BasketMode {
    /// First three characters of the instrument id
    #[default]
    Base,
    /// Characters four to six of the instrument id
    Quote,
    /// Every position in one `USD` bucket
    UsdProxy,
    /// Caller-supplied instrument → bucket map
    InstrumentBucket,
}

impl BasketMode {
    /// Case-insensitive parse; unknown names fall back to `Base`
    #[must_use]
    pub fn parse_lenient(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "quote" => Self::Quote,
            "usdproxy" => Self::UsdProxy,
            "instrumentbucket" => Self::InstrumentBucket,
            _ => Self::Base,
        }
    }
}

impl fmt::Display for BasketMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Base => "Base",
            Self::Quote => "Quote",
            Self::UsdProxy => "UsdProxy",
            Self::InstrumentBucket => "InstrumentBucket",
        })
    }
}

/// Currency conversion supplied by the host
pub trait CurrencyConverter: Send + Sync {
    /// Rate that converts one unit of `from` into `to`
    fn rate(&self, from: &Currency, to: &Currency) -> Decimal;
}

/// Converter that treats every pair as 1:1
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughFx;

impl CurrencyConverter for PassthroughFx {
    fn rate(&self, _from: &Currency, _to: &Currency) -> Decimal {
        Decimal::ONE
    }
}

/// Fixed rate table; unknown pairs convert at 1:1
#[derive(Debug, Clone, Default)]
pub struct StaticFx {
    rates: FxHashMap<(Currency, Currency), Decimal>,
}

impl StaticFx {
    /// Register a rate
    #[must_use]
    pub fn with_rate(mut self, from: Currency, to: Currency, rate: Decimal) -> Self {
        self.rates.insert((from, to), rate);
        self
    }
}

impl CurrencyConverter for StaticFx {
    fn rate(&self, from: &Currency, to: &Currency) -> Decimal {
        if from == to {
            return Decimal::ONE;
        }
        self.rates
            .get(&(from.clone(), to.clone()))
            .copied()
            .unwrap_or(Decimal::ONE)
    }
}

/// Initial risk of one open position
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionInitialRisk {
    /// Instrument
    pub instrument: InstrumentId,
    /// Money at risk
    pub initial_risk_money: Decimal,
    /// Currency the risk is denominated in
    pub currency: Currency,
}

fn basket_key<'a>(
    instrument: &'a InstrumentId,
    mode: BasketMode,
    buckets: &'a FxHashMap<String, String>,
) -> &'a str {
    let id = instrument.as_str();
    match mode {
        BasketMode::Base => id.get(..3).filter(|_| id.len() >= 6).unwrap_or(id),
        BasketMode::Quote => id.get(3..6).filter(|_| id.len() >= 6).unwrap_or(id),
        BasketMode::UsdProxy => "USD",
        BasketMode::InstrumentBucket => buckets.get(id).map_or(DEFAULT_BUCKET, String::as_str),
    }
}

/// Worst group's risk as a percentage of equity, rounded to 6 digits.
///
/// Zero equity (or no positions) gives zero.
#[must_use]
pub fn compute_basket_risk_pct(
    positions: &[PositionInitialRisk],
    mode: BasketMode,
    account_ccy: &Currency,
    equity: Decimal,
    buckets: &FxHashMap<String, String>,
    fx: &dyn CurrencyConverter,
) -> Decimal {
    if equity.is_zero() {
        return Decimal::ZERO;
    }

    let mut groups: FxHashMap<&str, Decimal> = FxHashMap::default();
    for position in positions {
        let converted = position.initial_risk_money * fx.rate(&position.currency, account_ccy);
        *groups
            .entry(basket_key(&position.instrument, mode, buckets))
            .or_default() += converted;
    }

    let worst = groups
        .values()
        .map(|sum| safe_div(*sum, equity) * Decimal::ONE_HUNDRED)
        .fold(Decimal::ZERO, Decimal::max);
    round6(worst)
}
