//! Risk policy engine
//!
//! Pre-trade enforcement for a single proposed order:
//! - Leverage, margin usage and per-position risk projections
//! - Worst-basket aggregation across open positions
//! - Allow / block / scale-to-fit decisions with journal-ready alerts
//! - Engine-level guardrails (session, daily caps, drawdown, news)
//!
//! Everything here is a pure function of its inputs. The enforcer holds only
//! the schema version and config hash stamped onto alerts, so one instance can
//! serve concurrent callers.

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod basket;
pub mod config;
pub mod formulas;
pub mod limits;

pub use basket::{
    BasketMode, CurrencyConverter, PassthroughFx, PositionInitialRisk, StaticFx,
    compute_basket_risk_pct,
};
pub use config::{ConfigError, EngineConfig, PromotionConfig, RiskConfig, config_hash, parity_config_hash};

use chrono::{DateTime, Utc};
use common::{Currency, EventType, InstrumentId};
use formulas::{
    percent_of_equity, project_leverage, project_margin_usage_pct, round_down_to_step, round6,
    safe_div, truncate6,
};
use limits::DailyCapAction;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use tracing::debug;

/// One order candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Instrument
    pub instrument: InstrumentId,
    /// Requested volume in lots
    pub requested_volume: Decimal,
    /// Notional value of the position after the order
    pub notional_value: Decimal,
    /// Used margin after the order
    pub used_margin_after_order: Decimal,
    /// Initial risk of the new position in account currency
    pub position_initial_risk_money: Decimal,
    /// Decision identifier carried onto alerts
    pub decision_id: String,
}

/// An open position as seen by the basket aggregator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenPosition {
    /// Instrument
    pub instrument: InstrumentId,
    /// Initial risk money
    pub initial_risk_money: Decimal,
}

/// Open positions at decision time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BasketSnapshot {
    /// Positions
    pub positions: Vec<OpenPosition>,
}

impl BasketSnapshot {
    /// Snapshot from `(instrument, initial risk)` pairs
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, Decimal)>) -> Self {
        Self {
            positions: pairs
                .into_iter()
                .map(|(id, risk)| OpenPosition {
                    instrument: InstrumentId::new(id),
                    initial_risk_money: risk,
                })
                .collect(),
        }
    }
}

/// Instrument metadata lookup supplied by the host
pub trait InstrumentCatalog: Send + Sync {
    /// Currency an instrument's risk is denominated in
    fn risk_currency(&self, instrument: &InstrumentId) -> Option<Currency>;
}

/// Catalog backed by a fixed map; unknown instruments have no currency
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    currencies: FxHashMap<InstrumentId, Currency>,
}

impl StaticCatalog {
    /// Register an instrument
    #[must_use]
    pub fn with_instrument(mut self, instrument: impl Into<InstrumentId>, currency: Currency) -> Self {
        self.currencies.insert(instrument.into(), currency);
        self
    }
}

impl InstrumentCatalog for StaticCatalog {
    fn risk_currency(&self, instrument: &InstrumentId) -> Option<Currency> {
        self.currencies.get(instrument).cloned()
    }
}

/// Everything the enforcer reads besides the proposal
pub struct RiskContext<'a> {
    /// Account equity
    pub equity: Decimal,
    /// Account currency; basket risk is converted into it
    pub account_currency: Currency,
    /// Open positions
    pub snapshot: &'a BasketSnapshot,
    /// Active policy
    pub config: &'a RiskConfig,
    /// Instrument lookup
    pub catalog: &'a dyn InstrumentCatalog,
    /// FX rates
    pub fx: &'a dyn CurrencyConverter,
}

/// Projected metrics before and, when scaling ran, after rounding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RiskObservations {
    /// Notional / equity
    pub projected_leverage: Decimal,
    /// Used margin as % of equity
    pub projected_margin_usage_pct: Decimal,
    /// New position risk as % of equity
    pub per_position_risk_pct: Decimal,
    /// Worst basket as % of equity
    pub basket_risk_pct: Decimal,
    /// Leverage after scaling
    pub post_round_leverage: Option<Decimal>,
    /// Margin usage after scaling
    pub post_round_margin_usage_pct: Option<Decimal>,
    /// Per-position risk after scaling
    pub post_round_per_position_risk_pct: Option<Decimal>,
    /// Basket risk after scaling
    pub post_round_basket_risk_pct: Option<Decimal>,
}

/// Alert categories the enforcer emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    /// Leverage cap breached
    BlockLeverage,
    /// Margin usage cap breached
    BlockMargin,
    /// Per-position risk cap breached
    BlockRiskCap,
    /// Basket risk cap breached
    BlockBasket,
    /// Order allowed at a reduced size
    InfoScale,
}

impl AlertKind {
    /// Journal event type
    #[must_use]
    pub const fn event_type(self) -> EventType {
        match self {
            Self::BlockLeverage => EventType::BlockLeverage,
            Self::BlockMargin => EventType::BlockMargin,
            Self::BlockRiskCap => EventType::BlockRiskCap,
            Self::BlockBasket => EventType::BlockBasket,
            Self::InfoScale => EventType::ScaleToFit,
        }
    }

    const fn block_reason(self) -> &'static str {
        match self {
            Self::BlockLeverage => "Leverage cap breach",
            Self::BlockMargin => "Margin usage cap breach",
            Self::BlockRiskCap => "Per-position risk cap breach",
            Self::BlockBasket => "Basket risk cap breach",
            Self::InfoScale => "Scaled to fit",
        }
    }
}

/// One alert produced by an enforcement call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertEvent {
    /// Category
    pub kind: AlertKind,
    /// Decision the alert belongs to
    pub decision_id: String,
    /// Instrument
    pub instrument: InstrumentId,
    /// Human-readable reason
    pub reason: String,
    /// Metric value that triggered the alert
    pub observed: Decimal,
    /// Cap it was compared against
    pub cap: Decimal,
    /// Account equity
    pub equity: Decimal,
    /// Proposal notional
    pub notional_value: Decimal,
    /// Proposal used margin
    pub used_margin_after_order: Decimal,
    /// Journal schema version
    pub schema_version: String,
    /// Config identity
    pub config_hash: String,
}

fn decimal_value(d: Decimal) -> Value {
    // Decimal's plain rendering is always a valid JSON number literal.
    Value::Number(serde_json::Number::from_string_unchecked(d.to_string()))
}

impl AlertEvent {
    /// Journal event type
    #[must_use]
    pub const fn event_type(&self) -> EventType {
        self.kind.event_type()
    }

    /// Journal payload
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut m = Map::new();
        m.insert("DecisionId".into(), Value::String(self.decision_id.clone()));
        m.insert("InstrumentId".into(), Value::String(self.instrument.to_string()));
        m.insert("Reason".into(), Value::String(self.reason.clone()));
        m.insert("Observed".into(), decimal_value(self.observed));
        m.insert("Cap".into(), decimal_value(self.cap));
        m.insert("Equity".into(), decimal_value(self.equity));
        m.insert("NotionalValue".into(), decimal_value(self.notional_value));
        m.insert(
            "UsedMarginAfterOrder".into(),
            decimal_value(self.used_margin_after_order),
        );
        m.insert("SchemaVersion".into(), Value::String(self.schema_version.clone()));
        m.insert("ConfigHash".into(), Value::String(self.config_hash.clone()));
        Value::Object(m)
    }
}

/// Outcome of one enforcement call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnforcementResult {
    /// Whether the order may proceed
    pub allowed: bool,
    /// `requested × Smax` before lot rounding
    pub scaled_volume_before_round: Option<Decimal>,
    /// Scaled volume after lot rounding
    pub scaled_volume_rounded: Option<Decimal>,
    /// Projected metrics
    pub observed: RiskObservations,
    /// Alerts, in emission order
    pub alerts: Vec<AlertEvent>,
}

impl EnforcementResult {
    fn allow(observed: RiskObservations) -> Self {
        Self {
            allowed: true,
            scaled_volume_before_round: None,
            scaled_volume_rounded: None,
            observed,
            alerts: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Breaches {
    leverage: bool,
    margin: bool,
    per_position: bool,
    basket: bool,
}

impl Breaches {
    fn of(leverage: Decimal, margin: Decimal, per_position: Decimal, basket: Decimal, cfg: &RiskConfig) -> Self {
        Self {
            leverage: leverage > cfg.real_leverage_cap,
            margin: margin > cfg.margin_usage_cap_pct,
            per_position: per_position > cfg.per_position_risk_cap_pct,
            // Baskets share the per-position cap.
            basket: basket > cfg.per_position_risk_cap_pct,
        }
    }

    const fn any(self) -> bool {
        self.leverage || self.margin || self.per_position || self.basket
    }
}

fn basket_positions(ctx: &RiskContext<'_>) -> Vec<PositionInitialRisk> {
    ctx.snapshot
        .positions
        .iter()
        .map(|pos| PositionInitialRisk {
            instrument: pos.instrument.clone(),
            initial_risk_money: pos.initial_risk_money,
            currency: ctx
                .catalog
                .risk_currency(&pos.instrument)
                .unwrap_or_else(|| ctx.account_currency.clone()),
        })
        .collect()
}

/// Pre-trade risk enforcer
#[derive(Debug, Clone)]
pub struct RiskEnforcer {
    schema_version: String,
    config_hash: String,
}

impl RiskEnforcer {
    /// Enforcer stamping alerts with the given schema version and config hash
    #[must_use]
    pub fn new(schema_version: impl Into<String>, config_hash: impl Into<String>) -> Self {
        Self {
            schema_version: schema_version.into(),
            config_hash: config_hash.into(),
        }
    }

    /// Decide allow / block / scale for one proposal
    #[must_use]
    pub fn enforce(&self, p: &Proposal, ctx: &RiskContext<'_>) -> EnforcementResult {
        let cfg = ctx.config;
        let leverage = project_leverage(p.notional_value, ctx.equity);
        let margin = project_margin_usage_pct(p.used_margin_after_order, ctx.equity);
        let per_position = percent_of_equity(p.position_initial_risk_money, ctx.equity);
        let basket = compute_basket_risk_pct(
            &basket_positions(ctx),
            cfg.basket_mode,
            &ctx.account_currency,
            ctx.equity,
            &cfg.instrument_buckets,
            ctx.fx,
        );

        let mut observed = RiskObservations {
            projected_leverage: leverage,
            projected_margin_usage_pct: margin,
            per_position_risk_pct: per_position,
            basket_risk_pct: basket,
            ..RiskObservations::default()
        };

        if !cfg.enforcement_enabled {
            return EnforcementResult::allow(observed);
        }

        let breaches = Breaches::of(leverage, margin, per_position, basket, cfg);
        if !breaches.any() {
            return EnforcementResult::allow(observed);
        }

        if !cfg.enable_scale_to_fit {
            debug!(decision = %p.decision_id, ?breaches, "blocking proposal");
            return self.block(p, ctx, breaches, observed, None, None);
        }

        let factor = |breached: bool, cap: Decimal, metric: Decimal| {
            if breached { truncate6(safe_div(cap, metric)) } else { Decimal::ONE }
        };
        let s_max = [
            factor(breaches.leverage, cfg.real_leverage_cap, leverage),
            factor(breaches.margin, cfg.margin_usage_cap_pct, margin),
            factor(breaches.per_position, cfg.per_position_risk_cap_pct, per_position),
            factor(breaches.basket, cfg.per_position_risk_cap_pct, basket),
        ]
        .into_iter()
        .fold(Decimal::ONE, Decimal::min);

        if s_max <= Decimal::ZERO {
            debug!(decision = %p.decision_id, %s_max, "non-positive scale factor, blocking");
            return self.block(p, ctx, breaches, observed, None, None);
        }

        let scaled_before = p
            .requested_volume
            .checked_mul(s_max)
            .unwrap_or(Decimal::ZERO);
        let scaled_rounded = round_down_to_step(scaled_before, cfg.lot_step);
        if scaled_rounded <= Decimal::ZERO {
            debug!(decision = %p.decision_id, %scaled_before, "scaled volume rounds to zero, blocking");
            return self.block(p, ctx, breaches, observed, Some(scaled_before), Some(scaled_rounded));
        }

        // Linear approximation: every metric shrinks by the volume ratio.
        let ratio = safe_div(scaled_rounded, p.requested_volume);
        let post = |metric: Decimal| metric.checked_mul(ratio).unwrap_or(metric);
        let (post_lev, post_margin, post_pos, post_basket) =
            (post(leverage), post(margin), post(per_position), post(basket));
        observed.post_round_leverage = Some(round6(post_lev));
        observed.post_round_margin_usage_pct = Some(round6(post_margin));
        observed.post_round_per_position_risk_pct = Some(round6(post_pos));
        observed.post_round_basket_risk_pct = Some(round6(post_basket));

        let post_breaches = Breaches::of(post_lev, post_margin, post_pos, post_basket, cfg);
        if post_breaches.any() {
            debug!(decision = %p.decision_id, ?post_breaches, "still breaching after scale, blocking");
            let post_observed = RiskObservations {
                projected_leverage: round6(post_lev),
                projected_margin_usage_pct: round6(post_margin),
                per_position_risk_pct: round6(post_pos),
                basket_risk_pct: round6(post_basket),
                ..observed
            };
            let mut result = self.block(
                p,
                ctx,
                post_breaches,
                post_observed,
                Some(scaled_before),
                Some(scaled_rounded),
            );
            result.observed = observed;
            return result;
        }

        debug!(
            decision = %p.decision_id,
            requested = %p.requested_volume,
            scaled = %scaled_rounded,
            "scaled to fit"
        );
        let info = self.alert(
            AlertKind::InfoScale,
            p,
            ctx,
            format!(
                "Scaled from {} to {scaled_rounded} (pre-round {scaled_before})",
                p.requested_volume
            ),
            leverage,
            cfg.real_leverage_cap,
        );
        EnforcementResult {
            allowed: true,
            scaled_volume_before_round: Some(scaled_before),
            scaled_volume_rounded: Some(scaled_rounded),
            observed,
            alerts: vec![info],
        }
    }

    fn block(
        &self,
        p: &Proposal,
        ctx: &RiskContext<'_>,
        breaches: Breaches,
        metrics: RiskObservations,
        scaled_before: Option<Decimal>,
        scaled_rounded: Option<Decimal>,
    ) -> EnforcementResult {
        let cfg = ctx.config;
        let candidates = [
            (breaches.leverage, AlertKind::BlockLeverage, metrics.projected_leverage, cfg.real_leverage_cap),
            (breaches.margin, AlertKind::BlockMargin, metrics.projected_margin_usage_pct, cfg.margin_usage_cap_pct),
            (breaches.per_position, AlertKind::BlockRiskCap, metrics.per_position_risk_pct, cfg.per_position_risk_cap_pct),
            (breaches.basket, AlertKind::BlockBasket, metrics.basket_risk_pct, cfg.per_position_risk_cap_pct),
        ];
        let alerts = candidates
            .into_iter()
            .filter(|(breached, ..)| *breached)
            .map(|(_, kind, observed, cap)| {
                self.alert(kind, p, ctx, kind.block_reason().to_owned(), observed, cap)
            })
            .collect();
        EnforcementResult {
            allowed: false,
            scaled_volume_before_round: scaled_before,
            scaled_volume_rounded: scaled_rounded,
            observed: metrics,
            alerts,
        }
    }

    fn alert(
        &self,
        kind: AlertKind,
        p: &Proposal,
        ctx: &RiskContext<'_>,
        reason: String,
        observed: Decimal,
        cap: Decimal,
    ) -> AlertEvent {
        AlertEvent {
            kind,
            decision_id: p.decision_id.clone(),
            instrument: p.instrument.clone(),
            reason,
            observed,
            cap,
            equity: ctx.equity,
            notional_value: p.notional_value,
            used_margin_after_order: p.used_margin_after_order,
            schema_version: self.schema_version.clone(),
            config_hash: self.config_hash.clone(),
        }
    }
}

/// Engine state checked by [`evaluate_guardrails`]
#[derive(Debug, Clone, Copy)]
pub struct GuardrailInputs<'a> {
    /// Decision time
    pub now: DateTime<Utc>,
    /// Symbol being traded
    pub symbol: &'a str,
    /// Signed net exposure for the symbol after the order
    pub net_exposure: Decimal,
    /// Realized PnL for the current UTC day
    pub daily_pnl: Decimal,
    /// Current peak-to-trough drawdown of the run
    pub run_drawdown: Decimal,
    /// Scheduled news event times
    pub news_events: &'a [DateTime<Utc>],
}

/// Engine-level guardrail alerts that apply to a decision, in check order.
/// An empty result means no guardrail fired.
#[must_use]
pub fn evaluate_guardrails(cfg: &RiskConfig, input: &GuardrailInputs<'_>) -> Vec<EventType> {
    let mut fired = Vec::new();
    if cfg
        .session_window
        .is_some_and(|window| !window.contains(&input.now))
    {
        fired.push(EventType::BlockSessionWindow);
    }
    if cfg
        .news_blackout
        .as_ref()
        .is_some_and(|nb| nb.is_blocked(&input.now, input.news_events))
    {
        fired.push(EventType::BlockNewsBlackout);
    }
    let exposure_cap = cfg
        .max_net_exposure_by_symbol
        .as_ref()
        .and_then(|caps| caps.get(input.symbol));
    if exposure_cap.is_some_and(|cap| input.net_exposure.abs() > cap.abs()) {
        fired.push(EventType::BlockNetExposure);
    }
    if let Some(cap) = cfg.daily_cap {
        match (cap.evaluate(input.daily_pnl), cap.action_on_breach) {
            (Some(limits::DailyCapBreach::Loss), _) => fired.push(EventType::BlockDailyLossCap),
            (Some(limits::DailyCapBreach::Gain), DailyCapAction::Block) => {
                fired.push(EventType::BlockDailyGainCap);
            }
            (Some(limits::DailyCapBreach::Gain), DailyCapAction::HalfSize) => {
                fired.push(EventType::ThrottleDailyGainCap);
            }
            (None, _) => {}
        }
    }
    if cfg
        .global_drawdown
        .is_some_and(|dd| dd.is_breached(input.run_drawdown))
    {
        fired.push(EventType::BlockGlobalDrawdown);
    }
    if !fired.is_empty() {
        debug!(symbol = input.symbol, ?fired, "guardrails fired");
    }
    fired
}
