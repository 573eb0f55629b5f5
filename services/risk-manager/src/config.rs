//! Engine configuration document and risk configuration parsing
//!
//! Field names are canonical `snake_case`. Alternate spellings listed in
//! [`FIELD_ALIASES`] are folded onto the canonical name once, when each
//! object is read; nothing downstream looks a field up twice.

use crate::basket::BasketMode;
use crate::limits::{DailyCap, DailyCapAction, GlobalDrawdown, NewsBlackout, SessionWindow};
use chrono::NaiveTime;
use common::{FeatureMode, RiskMode};
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use serde_json::{Map, Number, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use storage::{canonical_json, sha256_hex};
use thiserror::Error;
use tracing::{debug, warn};

/// Canonical field name and the alternate spelling accepted for it
pub const FIELD_ALIASES: &[(&str, &str)] = &[
    ("real_leverage_cap", "realLeverageCap"),
    ("margin_usage_cap_pct", "marginUsageCapPct"),
    ("per_position_risk_cap_pct", "perPositionRiskCapPct"),
    ("basket_mode", "basketMode"),
    ("instrument_buckets", "instrumentBuckets"),
    ("enable_scale_to_fit", "enableScaleToFit"),
    ("enforcement_enabled", "enforcementEnabled"),
    ("lot_step", "lotStep"),
    ("max_net_exposure_by_symbol", "maxNetExposureBySymbol"),
    ("max_units_per_symbol", "maxUnitsPerSymbol"),
    ("max_run_drawdown_ccy", "maxRunDrawdownCcy"),
    ("block_on_breach", "blockOnBreach"),
    ("emit_evaluations", "emitEvaluations"),
    ("session_window", "sessionWindow"),
    ("start_utc", "startUtc"),
    ("end_utc", "endUtc"),
    ("daily_cap", "dailyCap"),
    ("action_on_breach", "actionOnBreach"),
    ("global_drawdown", "globalDrawdown"),
    ("max_dd", "maxDd"),
    ("news_blackout", "newsBlackout"),
    ("minutes_before", "minutesBefore"),
    ("minutes_after", "minutesAfter"),
    ("source_path", "sourcePath"),
    ("poll_seconds", "pollSeconds"),
    ("source_type", "sourceType"),
    ("shadow_candidates", "shadowCandidates"),
    ("probation_days", "probationDays"),
    ("min_trades", "minTrades"),
    ("promotion_threshold", "promotionThreshold"),
    ("demotion_threshold", "demotionThreshold"),
];

/// Equity assumed when the document does not set one
pub const DEFAULT_EQUITY: Decimal = Decimal::from_parts(100_000, 0, 0, false, 0);

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File could not be read
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// Config path
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// Document is not JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Root is not an object
    #[error("configuration root must be a JSON object")]
    NotAnObject,

    /// Field present with the wrong JSON type
    #[error("{field} must be {expected}")]
    InvalidType {
        /// Dotted field path
        field: String,
        /// Expected type
        expected: &'static str,
    },

    /// Required field absent
    #[error("{0} must be provided")]
    MissingField(String),

    /// Bad `HH:mm[:ss]` value
    #[error("invalid time of day '{0}', expected HH:mm or HH:mm:ss")]
    InvalidTimeOfDay(String),

    /// Bad daily cap action
    #[error("unsupported daily cap action '{0}', expected 'block' or 'half_size'")]
    InvalidDailyCapAction(String),
}

type Result<T> = std::result::Result<T, ConfigError>;

/// Exact decimal from a JSON number, accepting exponent forms
#[must_use]
pub fn decimal_from_number(n: &Number) -> Option<Decimal> {
    let raw = n.to_string();
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

/// One JSON object with aliases folded onto canonical names
struct Section {
    path: String,
    fields: Map<String, Value>,
}

impl Section {
    fn resolve(path: impl Into<String>, object: &Map<String, Value>) -> Self {
        let path = path.into();
        let mut fields = object.clone();
        for (canonical, alias) in FIELD_ALIASES {
            let Some(value) = fields.remove(*alias) else {
                continue;
            };
            if fields.contains_key(*canonical) {
                warn!("{path}: both {canonical} and {alias} set, using {canonical}");
            } else {
                fields.insert((*canonical).to_owned(), value);
            }
        }
        Self { path, fields }
    }

    fn field(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{key}", self.path)
        }
    }

    fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key).filter(|v| !v.is_null())
    }

    fn invalid(&self, key: &str, expected: &'static str) -> ConfigError {
        ConfigError::InvalidType {
            field: self.field(key),
            expected,
        }
    }

    fn decimal(&self, key: &str) -> Result<Option<Decimal>> {
        self.get(key)
            .map(|v| match v {
                Value::Number(n) => decimal_from_number(n).ok_or_else(|| self.invalid(key, "a decimal")),
                _ => Err(self.invalid(key, "a number")),
            })
            .transpose()
    }

    fn integer(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|v| v.as_i64().ok_or_else(|| self.invalid(key, "an integer")))
            .transpose()
    }

    fn boolean(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|v| v.as_bool().ok_or_else(|| self.invalid(key, "a boolean")))
            .transpose()
    }

    fn string(&self, key: &str) -> Result<Option<String>> {
        self.get(key)
            .map(|v| {
                v.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| self.invalid(key, "a string"))
            })
            .transpose()
    }

    fn object(&self, key: &str) -> Result<Option<&Map<String, Value>>> {
        self.get(key)
            .map(|v| v.as_object().ok_or_else(|| self.invalid(key, "an object")))
            .transpose()
    }

    /// Non-null entries of the object at `key`, each converted by `convert`
    fn entries<T>(
        &self,
        key: &str,
        expected: &'static str,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<FxHashMap<String, T>>> {
        let Some(obj) = self.object(key)? else {
            return Ok(None);
        };
        obj.iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(name, v)| {
                convert(v)
                    .map(|item| (name.clone(), item))
                    .ok_or_else(|| self.invalid(&format!("{key}.{name}"), expected))
            })
            .collect::<Result<FxHashMap<_, _>>>()
            .map(Some)
    }

    fn section(&self, key: &str) -> Result<Option<Self>> {
        Ok(self.object(key)?.map(|obj| Self::resolve(self.field(key), obj)))
    }

    fn as_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }
}

/// Promotion policy carried inside the risk block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromotionConfig {
    /// Master switch
    pub enabled: bool,
    /// Configurations running in shadow
    pub shadow_candidates: Vec<String>,
    /// Days a promoted candidate stays on probation
    pub probation_days: i64,
    /// Trades needed before a decision
    pub min_trades: i64,
    /// Score at or above which a candidate is promoted
    pub promotion_threshold: Decimal,
    /// Score at or below which a candidate is demoted
    pub demotion_threshold: Decimal,
    /// Canonical hash of the promotion block; empty when absent
    pub config_hash: String,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            shadow_candidates: Vec::new(),
            probation_days: 30,
            min_trades: 50,
            promotion_threshold: Decimal::new(6, 1),
            demotion_threshold: Decimal::new(4, 1),
            config_hash: String::new(),
        }
    }
}

impl PromotionConfig {
    fn parse(section: &Section) -> Result<Self> {
        let defaults = Self::default();
        let shadow_candidates = match section.get("shadow_candidates") {
            None => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| section.invalid("shadow_candidates", "an array of strings"))
                })
                .collect::<Result<_>>()?,
            Some(_) => return Err(section.invalid("shadow_candidates", "an array of strings")),
        };
        Ok(Self {
            enabled: section.boolean("enabled")?.unwrap_or(defaults.enabled),
            shadow_candidates,
            probation_days: section.integer("probation_days")?.unwrap_or(defaults.probation_days),
            min_trades: section.integer("min_trades")?.unwrap_or(defaults.min_trades),
            promotion_threshold: section
                .decimal("promotion_threshold")?
                .unwrap_or(defaults.promotion_threshold),
            demotion_threshold: section
                .decimal("demotion_threshold")?
                .unwrap_or(defaults.demotion_threshold),
            config_hash: sha256_hex(canonical_json(&section.as_value()).as_bytes()),
        })
    }
}

/// Risk policy for one run. Loaded once and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskConfig {
    /// Maximum notional / equity
    pub real_leverage_cap: Decimal,
    /// Maximum used margin as % of equity
    pub margin_usage_cap_pct: Decimal,
    /// Maximum single-position risk as % of equity; also caps baskets
    pub per_position_risk_cap_pct: Decimal,
    /// Basket grouping
    pub basket_mode: BasketMode,
    /// Instrument → bucket for [`BasketMode::InstrumentBucket`]
    pub instrument_buckets: FxHashMap<String, String>,
    /// Shrink breaching orders instead of blocking them
    pub enable_scale_to_fit: bool,
    /// When false every proposal is allowed
    pub enforcement_enabled: bool,
    /// Minimum order increment
    pub lot_step: Decimal,
    /// Absolute net exposure cap per symbol
    pub max_net_exposure_by_symbol: Option<FxHashMap<String, Decimal>>,
    /// Unit cap per symbol
    pub max_units_per_symbol: Option<FxHashMap<String, i64>>,
    /// Run drawdown cap in account currency
    pub max_run_drawdown_ccy: Option<Decimal>,
    /// Active mode suppresses trades on breach
    pub block_on_breach: bool,
    /// Emit `INFO_RISK_EVAL_V1` events
    pub emit_evaluations: bool,
    /// Trading session
    pub session_window: Option<SessionWindow>,
    /// Daily PnL caps
    pub daily_cap: Option<DailyCap>,
    /// Run drawdown limit
    pub global_drawdown: Option<GlobalDrawdown>,
    /// News blackout
    pub news_blackout: Option<NewsBlackout>,
    /// Promotion policy
    pub promotion: PromotionConfig,
    /// Canonical hash of the risk block, when one was given
    pub risk_config_hash: Option<String>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            real_leverage_cap: Decimal::new(20, 0),
            margin_usage_cap_pct: Decimal::new(80, 0),
            per_position_risk_cap_pct: Decimal::ONE,
            basket_mode: BasketMode::Base,
            instrument_buckets: FxHashMap::default(),
            enable_scale_to_fit: false,
            enforcement_enabled: true,
            lot_step: Decimal::new(1, 2),
            max_net_exposure_by_symbol: None,
            max_units_per_symbol: None,
            max_run_drawdown_ccy: None,
            block_on_breach: true,
            emit_evaluations: true,
            session_window: None,
            daily_cap: None,
            global_drawdown: None,
            news_blackout: None,
            promotion: PromotionConfig::default(),
            risk_config_hash: None,
        }
    }
}

impl RiskConfig {
    /// Parse a risk block (a JSON object)
    pub fn from_value(risk: &Value) -> Result<Self> {
        let object = risk.as_object().ok_or(ConfigError::NotAnObject)?;
        Self::parse(&Section::resolve("risk", object))
    }

    fn parse(s: &Section) -> Result<Self> {
        let d = Self::default();

        let instrument_buckets = s
            .entries("instrument_buckets", "a string", |v| v.as_str().map(str::to_owned))?
            .unwrap_or_default();

        let max_net_exposure_by_symbol = s
            .entries("max_net_exposure_by_symbol", "a number", |v| match v {
                Value::Number(n) => decimal_from_number(n),
                _ => None,
            })?
            .filter(|caps| !caps.is_empty());

        let max_units_per_symbol = s
            .entries("max_units_per_symbol", "an integer", Value::as_i64)?
            .filter(|caps| !caps.is_empty());

        let global_drawdown = match s.section("global_drawdown")? {
            Some(section) => section.decimal("max_dd")?.map(|max_dd| GlobalDrawdown { max_dd }),
            None => None,
        };
        let legacy_drawdown = s.decimal("max_run_drawdown_ccy")?;
        let global_drawdown =
            global_drawdown.or_else(|| legacy_drawdown.map(|max_dd| GlobalDrawdown { max_dd }));

        let promotion = match s.section("promotion")? {
            Some(section) => PromotionConfig::parse(&section)?,
            None => PromotionConfig::default(),
        };

        Ok(Self {
            real_leverage_cap: s.decimal("real_leverage_cap")?.unwrap_or(d.real_leverage_cap),
            margin_usage_cap_pct: s
                .decimal("margin_usage_cap_pct")?
                .unwrap_or(d.margin_usage_cap_pct),
            per_position_risk_cap_pct: s
                .decimal("per_position_risk_cap_pct")?
                .unwrap_or(d.per_position_risk_cap_pct),
            basket_mode: s
                .string("basket_mode")?
                .map_or(d.basket_mode, |m| BasketMode::parse_lenient(&m)),
            instrument_buckets,
            enable_scale_to_fit: s.boolean("enable_scale_to_fit")?.unwrap_or(d.enable_scale_to_fit),
            enforcement_enabled: s.boolean("enforcement_enabled")?.unwrap_or(d.enforcement_enabled),
            lot_step: s.decimal("lot_step")?.unwrap_or(d.lot_step),
            max_net_exposure_by_symbol,
            max_units_per_symbol,
            max_run_drawdown_ccy: global_drawdown.map(|g| g.max_dd),
            block_on_breach: s.boolean("block_on_breach")?.unwrap_or(d.block_on_breach),
            emit_evaluations: s.boolean("emit_evaluations")?.unwrap_or(d.emit_evaluations),
            session_window: parse_session_window(s)?,
            daily_cap: parse_daily_cap(s)?,
            global_drawdown,
            news_blackout: parse_news_blackout(s)?,
            promotion,
            risk_config_hash: Some(sha256_hex(canonical_json(&s.as_value()).as_bytes())),
        })
    }

    /// Whether any per-symbol exposure cap is exactly zero
    #[must_use]
    pub fn has_zero_exposure_cap(&self) -> bool {
        self.max_net_exposure_by_symbol
            .as_ref()
            .is_some_and(|caps| caps.values().any(Decimal::is_zero))
    }
}

fn parse_time_of_day(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| ConfigError::InvalidTimeOfDay(raw.to_owned()))
}

fn parse_session_window(parent: &Section) -> Result<Option<SessionWindow>> {
    let Some(s) = parent.section("session_window")? else {
        return Ok(None);
    };
    let bound = |key: &str| -> Result<NaiveTime> {
        let raw = s
            .string(key)?
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField(s.field(key)))?;
        parse_time_of_day(&raw)
    };
    Ok(Some(SessionWindow {
        start_utc: bound("start_utc")?,
        end_utc: bound("end_utc")?,
    }))
}

fn parse_daily_cap(parent: &Section) -> Result<Option<DailyCap>> {
    let Some(s) = parent.section("daily_cap")? else {
        return Ok(None);
    };
    let loss = s.decimal("loss")?;
    let gain = s.decimal("gain")?;
    if loss.is_none() && gain.is_none() {
        debug!("daily_cap has no thresholds, ignoring");
        return Ok(None);
    }
    let action_on_breach = match s.string("action_on_breach")?.filter(|a| !a.trim().is_empty()) {
        None => DailyCapAction::Block,
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "block" => DailyCapAction::Block,
            "half_size" | "half-size" | "halfsize" => DailyCapAction::HalfSize,
            _ => return Err(ConfigError::InvalidDailyCapAction(raw)),
        },
    };
    Ok(Some(DailyCap {
        loss,
        gain,
        action_on_breach,
    }))
}

fn parse_news_blackout(parent: &Section) -> Result<Option<NewsBlackout>> {
    let Some(s) = parent.section("news_blackout")? else {
        return Ok(None);
    };
    let d = NewsBlackout::default();
    Ok(Some(NewsBlackout {
        enabled: s.boolean("enabled")?.unwrap_or(d.enabled),
        minutes_before: s.integer("minutes_before")?.unwrap_or(d.minutes_before),
        minutes_after: s.integer("minutes_after")?.unwrap_or(d.minutes_after),
        source_path: s.string("source_path")?.filter(|p| !p.trim().is_empty()),
        poll_seconds: s.integer("poll_seconds")?.unwrap_or(d.poll_seconds),
        source_type: s.string("source_type")?.unwrap_or(d.source_type),
    }))
}

/// Uppercase SHA-256 of the canonical JSON of the whole document
#[must_use]
pub fn config_hash(document: &Value) -> String {
    sha256_hex(canonical_json(document).as_bytes())
}

/// Config hash that ignores sentiment-only settings, so OFF and SHADOW runs
/// of the same configuration share an identity. Drops the root
/// `sentimentConfig` subtree and the `featureFlags.sentiment` and
/// `featureFlags.riskProbe` toggles.
#[must_use]
pub fn parity_config_hash(document: &Value) -> String {
    let mut filtered = document.clone();
    if let Some(root) = filtered.as_object_mut() {
        root.remove("sentimentConfig");
        if let Some(flags) = root.get_mut("featureFlags").and_then(Value::as_object_mut) {
            flags.remove("sentiment");
            flags.remove("riskProbe");
        }
    }
    config_hash(&filtered)
}

/// A parsed engine configuration document
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Document as loaded
    pub document: Value,
    /// `name`, when set
    pub name: Option<String>,
    /// Account equity
    pub equity: Decimal,
    /// `featureFlags.risk`
    pub risk_mode: RiskMode,
    /// `featureFlags.sentiment`
    pub sentiment_mode: FeatureMode,
    /// `featureFlags.penalty`
    pub penalty_mode: FeatureMode,
    /// Merged risk blocks
    pub risk: RiskConfig,
    /// [`config_hash`] of the document
    pub config_hash: String,
    /// [`parity_config_hash`] of the document
    pub parity_config_hash: String,
}

impl EngineConfig {
    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse configuration text
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(raw)?;
        Self::from_document(document)
    }

    /// Parse an already-decoded document.
    ///
    /// The legacy `risk` block is read first; fields in `riskConfig` replace it.
    pub fn from_document(document: Value) -> Result<Self> {
        let root_map = document.as_object().ok_or(ConfigError::NotAnObject)?;
        let root = Section::resolve("", root_map);

        let mut merged = Map::new();
        for block in ["risk", "riskConfig"] {
            if let Some(obj) = root.object(block)? {
                merged.extend(Section::resolve(block, obj).fields);
            }
        }
        let risk = if merged.is_empty() {
            RiskConfig::default()
        } else {
            RiskConfig::parse(&Section::resolve("riskConfig", &merged))?
        };

        let equity = root.decimal("equity")?.unwrap_or(DEFAULT_EQUITY);

        Ok(Self {
            name: root.string("name")?,
            equity,
            risk_mode: FeatureMode::risk_from_config(&document),
            sentiment_mode: FeatureMode::sentiment_from_config(&document),
            penalty_mode: FeatureMode::penalty_from_config(&document),
            risk,
            config_hash: config_hash(&document),
            parity_config_hash: parity_config_hash(&document),
            document,
        })
    }

    /// Input data files: `data.instrumentsFile`, then `data.ticks` values by
    /// symbol. Relative paths resolve against `base_dir`; missing files are
    /// skipped.
    #[must_use]
    pub fn data_files(&self, base_dir: &Path) -> Vec<PathBuf> {
        let Some(data) = self.document.get("data").and_then(Value::as_object) else {
            return Vec::new();
        };
        let resolve = |raw: &str| {
            let p = Path::new(raw);
            if p.is_absolute() { p.to_path_buf() } else { base_dir.join(p) }
        };

        let mut files = Vec::new();
        if let Some(inst) = data.get("instrumentsFile").and_then(Value::as_str) {
            files.push(resolve(inst));
        }
        if let Some(ticks) = data.get("ticks").and_then(Value::as_object) {
            let mut entries: Vec<_> = ticks.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            files.extend(
                entries
                    .into_iter()
                    .filter_map(|(_, v)| v.as_str())
                    .filter(|raw| !raw.trim().is_empty())
                    .map(resolve),
            );
        }
        files.retain(|p| p.is_file());
        files
    }
}
