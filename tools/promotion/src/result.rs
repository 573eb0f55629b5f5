//! The `PROMOTION_RESULT_V1` document

use crate::analysis::{DataQaFacts, RunFacts};
use crate::checks::{PenaltyParity, RiskParity, SentimentParity};
use crate::error::Result;
use journal_verify::{EXIT_OK, EXIT_VIOLATIONS, ParityReport};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Value of the `type` field
pub const RESULT_TYPE: &str = "PROMOTION_RESULT_V1";

/// Why the gate decided the way it did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Every rung passed
    #[default]
    #[serde(rename = "accept")]
    Accept,
    /// Baseline engine run failed or timed out
    #[serde(rename = "baseline_run_failed")]
    BaselineRunFailed,
    /// A candidate engine run failed or timed out
    #[serde(rename = "candidate_run_failed")]
    CandidateRunFailed,
    /// Baseline journal failed strict verification
    #[serde(rename = "baseline_verify_failed")]
    BaselineVerifyFailed,
    /// Candidate journal failed strict verification
    #[serde(rename = "verify_failed")]
    VerifyFailed,
    /// The two candidate runs differ
    #[serde(rename = "Determinism parity failed")]
    DeterminismFailed,
    /// Candidate data QA aborted or failed
    #[serde(rename = "data_qa_failed")]
    DataQaFailed,
    /// Risk mode or alert divergence
    #[serde(rename = "risk_mismatch")]
    RiskMismatch,
    /// Different number of closed trades
    #[serde(rename = "trade_count_mismatch")]
    TradeCountMismatch,
    /// Candidate PnL below baseline
    #[serde(rename = "PnL worsened")]
    PnlWorsened,
    /// Candidate drawdown above baseline
    #[serde(rename = "MaxDD worsened")]
    MaxDrawdownWorsened,
    /// Sentiment mode or event divergence
    #[serde(rename = "sentiment_mismatch")]
    SentimentMismatch,
    /// Penalty mode or event divergence
    #[serde(rename = "penalty_mismatch")]
    PenaltyMismatch,
    /// Baseline and candidate outputs differ
    #[serde(rename = "parity_mismatch")]
    ParityMismatch,
}

impl Decision {
    /// Reason string carried in the result
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::BaselineRunFailed => "baseline_run_failed",
            Self::CandidateRunFailed => "candidate_run_failed",
            Self::BaselineVerifyFailed => "baseline_verify_failed",
            Self::VerifyFailed => "verify_failed",
            Self::DeterminismFailed => "Determinism parity failed",
            Self::DataQaFailed => "data_qa_failed",
            Self::RiskMismatch => "risk_mismatch",
            Self::TradeCountMismatch => "trade_count_mismatch",
            Self::PnlWorsened => "PnL worsened",
            Self::MaxDrawdownWorsened => "MaxDD worsened",
            Self::SentimentMismatch => "sentiment_mismatch",
            Self::PenaltyMismatch => "penalty_mismatch",
            Self::ParityMismatch => "parity_mismatch",
        }
    }

    /// Whether the candidate may be promoted
    #[must_use]
    pub const fn is_accept(self) -> bool {
        matches!(self, Self::Accept)
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Candidate A against candidate B
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeterminismSection {
    /// The comparison ran
    pub checked: bool,
    /// Events hashes equal
    pub events_match: bool,
    /// Trades hashes equal
    pub trades_match: bool,
    /// Candidate A events hash
    pub events_hash_a: String,
    /// Candidate B events hash
    pub events_hash_b: String,
    /// Candidate A trades hash
    pub trades_hash_a: String,
    /// Candidate B trades hash
    pub trades_hash_b: String,
    /// Retained diagnostic dump on mismatch
    pub diagnostic: Option<PathBuf>,
}

/// QA outcome of both sides
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataQaSection {
    /// Baseline QA
    pub baseline: DataQaFacts,
    /// Candidate QA
    pub candidate: DataQaFacts,
}

/// Final baseline-versus-candidate comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinalParity {
    /// The comparison ran
    pub checked: bool,
    /// Mismatches are tolerated
    pub overridden: bool,
    /// Snapshot, when it ran
    pub report: Option<ParityReport>,
}

/// Everything the gate learned, plus its decision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PromotionResult {
    /// Always [`RESULT_TYPE`]
    #[serde(rename = "type")]
    pub kind: &'static str,
    /// Candidate may be promoted
    pub accepted: bool,
    /// First rung that fired, or `accept`
    pub reason: Decision,
    /// Baseline config hash
    pub baseline_config_hash: String,
    /// Candidate config hash
    pub candidate_config_hash: String,
    /// Baseline run facts, once analysed
    pub baseline: Option<RunFacts>,
    /// Candidate A run facts, once analysed
    pub candidate: Option<RunFacts>,
    /// Candidate A vs B
    pub determinism: DeterminismSection,
    /// QA outcome
    #[serde(rename = "dataQa")]
    pub data_qa: DataQaSection,
    /// Risk parity
    pub risk: RiskParity,
    /// Sentiment parity
    pub sentiment: SentimentParity,
    /// Penalty parity
    pub penalty: PenaltyParity,
    /// Baseline vs candidate
    pub parity: FinalParity,
    /// Artifact directory kept on disk, if any
    pub artifacts: Option<PathBuf>,
}

impl PromotionResult {
    /// Empty result tagged with the result type
    #[must_use]
    pub fn new(baseline_config_hash: String, candidate_config_hash: String) -> Self {
        Self {
            kind: RESULT_TYPE,
            accepted: true,
            baseline_config_hash,
            candidate_config_hash,
            ..Self::default()
        }
    }

    /// Record the final decision
    #[must_use]
    pub fn decide(mut self, decision: Decision) -> Self {
        self.accepted = decision.is_accept();
        self.reason = decision;
        self
    }

    /// 0 when accepted, 2 when rejected
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        if self.accepted { EXIT_OK } else { EXIT_VIOLATIONS }
    }

    /// The result as one compact JSON line
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Multi-line text for terminals
    #[must_use]
    pub fn human_summary(&self) -> String {
        let mut out = format!(
            "PROMOTION: {} ({})",
            if self.accepted { "ACCEPT" } else { "REJECT" },
            self.reason
        );
        for (label, facts) in [("baseline", &self.baseline), ("candidate", &self.candidate)] {
            if let Some(f) = facts {
                out.push_str(&format!(
                    "\n  {label}: pnl={} max_dd={} trades={} alerts={}",
                    f.pnl, f.max_dd, f.trades, f.alerts
                ));
            }
        }
        if self.determinism.checked {
            out.push_str(&format!(
                "\n  determinism: events={} trades={}",
                self.determinism.events_match, self.determinism.trades_match
            ));
        }
        if let Some(path) = &self.determinism.diagnostic {
            out.push_str(&format!("\n  diagnostic: {}", path.display()));
        }
        for (label, reason, hint) in [
            ("risk", &self.risk.reason, &self.risk.diff_hint),
            ("sentiment", &self.sentiment.reason, &self.sentiment.diff_hint),
            ("penalty", &self.penalty.reason, &self.penalty.diff_hint),
        ] {
            if !hint.is_empty() {
                out.push_str(&format!("\n  {label}: {reason} ({hint})"));
            }
        }
        out
    }
}
