//! Baseline-versus-candidate feature parity
//!
//! Each check compares the configured modes first, then the journal lines
//! the feature produced. Moving a feature from shadow (or off) to active is
//! benign as long as the candidate's active feature had no observable effect.

use crate::analysis::RunAnalysis;
use common::FeatureMode;
use serde::Serialize;

/// Reason string for a passing section
pub const OK: &str = "ok";
/// Risk section reject reason
pub const RISK_MISMATCH: &str = "risk_mismatch";
/// Sentiment section reject reason
pub const SENTIMENT_MISMATCH: &str = "sentiment_mismatch";
/// Penalty section reject reason
pub const PENALTY_MISMATCH: &str = "penalty_mismatch";

/// Alert and row counts of one side of the risk comparison
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RiskCounts {
    /// `ALERT_BLOCK_*` rows
    pub alerts: usize,
    /// Event rows
    pub rows: usize,
}

impl From<&RunAnalysis> for RiskCounts {
    fn from(run: &RunAnalysis) -> Self {
        Self {
            alerts: run.facts.alerts,
            rows: run.facts.events,
        }
    }
}

/// Risk mode and alert parity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RiskParity {
    /// Baseline `featureFlags.risk`
    pub baseline_mode: FeatureMode,
    /// Candidate `featureFlags.risk`
    pub candidate_mode: FeatureMode,
    /// No risk divergence found
    pub parity: bool,
    /// `ok` or `risk_mismatch`
    pub reason: String,
    /// What diverged, empty when in parity
    pub diff_hint: String,
    /// Baseline counts
    pub baseline: RiskCounts,
    /// Candidate counts
    pub candidate: RiskCounts,
}

impl RiskParity {
    /// Compare risk behaviour. `zero_exposure_cap` reports whether the
    /// candidate configuration caps some symbol's exposure at zero.
    #[must_use]
    pub fn evaluate(
        modes: (FeatureMode, FeatureMode),
        baseline: &RunAnalysis,
        candidate: &RunAnalysis,
        zero_exposure_cap: bool,
    ) -> Self {
        let (base_mode, cand_mode) = modes;
        let base_counts = RiskCounts::from(baseline);
        let cand_counts = RiskCounts::from(candidate);

        let hint = match (base_mode, cand_mode) {
            (FeatureMode::Active, m) if m != FeatureMode::Active => Some("mode_downgrade".to_owned()),
            (FeatureMode::Shadow, FeatureMode::Active)
                if zero_exposure_cap && base_counts != cand_counts =>
            {
                Some("unexpected_active_alerts".to_owned())
            }
            (FeatureMode::Active, FeatureMode::Active) if baseline.alert_lines != candidate.alert_lines => {
                Some(format!(
                    "alert lines baseline={} candidate={}",
                    baseline.alert_lines.len(),
                    candidate.alert_lines.len()
                ))
            }
            _ => None,
        };

        Self {
            baseline_mode: base_mode,
            candidate_mode: cand_mode,
            parity: hint.is_none(),
            reason: if hint.is_some() { RISK_MISMATCH } else { OK }.to_owned(),
            diff_hint: hint.unwrap_or_default(),
            baseline: base_counts,
            candidate: cand_counts,
        }
    }
}

/// Sentiment mode and event parity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SentimentParity {
    /// Baseline `featureFlags.sentiment`
    pub baseline_mode: FeatureMode,
    /// Candidate `featureFlags.sentiment`
    pub candidate_mode: FeatureMode,
    /// No sentiment divergence found
    pub parity: bool,
    /// `ok` or `sentiment_mismatch`
    pub reason: String,
    /// What diverged, empty when in parity
    pub diff_hint: String,
    /// Baseline `INFO_SENTIMENT_APPLIED_V1` rows
    pub baseline_applied: usize,
    /// Candidate `INFO_SENTIMENT_APPLIED_V1` rows
    pub candidate_applied: usize,
}

impl SentimentParity {
    /// Compare sentiment behaviour
    #[must_use]
    pub fn evaluate(modes: (FeatureMode, FeatureMode), baseline: &RunAnalysis, candidate: &RunAnalysis) -> Self {
        let (base_mode, cand_mode) = modes;
        let base_applied = baseline.facts.sentiment_applied;
        let cand_applied = candidate.facts.sentiment_applied;

        let hint = mode_change_hint(modes, cand_applied).or_else(|| {
            if base_mode != FeatureMode::Active || cand_mode != FeatureMode::Active {
                return None;
            }
            if base_applied != cand_applied {
                return Some(format!("sentiment applied: baseline={base_applied} candidate={cand_applied}"));
            }
            first_divergence(&baseline.sentiment_lines, &candidate.sentiment_lines)
                .map(|i| format!("sentiment event {}: lines differ", i + 1))
        });

        Self {
            baseline_mode: base_mode,
            candidate_mode: cand_mode,
            parity: hint.is_none(),
            reason: if hint.is_some() { SENTIMENT_MISMATCH } else { OK }.to_owned(),
            diff_hint: hint.unwrap_or_default(),
            baseline_applied: base_applied,
            candidate_applied: cand_applied,
        }
    }
}

/// Penalty parity verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityFlag {
    /// In parity
    #[default]
    Ok,
    /// Diverged
    Mismatch,
}

/// Penalty mode and event parity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PenaltyParity {
    /// Baseline `featureFlags.penalty`
    pub baseline_mode: FeatureMode,
    /// Candidate `featureFlags.penalty`
    pub candidate_mode: FeatureMode,
    /// `ok` or `mismatch`
    pub parity: ParityFlag,
    /// `ok` or `penalty_mismatch`
    pub reason: String,
    /// `penalty seq: baseline=<n> candidate=<m>` naming the first differing
    /// penalty event; empty when in parity
    pub diff_hint: String,
    /// Baseline `PENALTY_APPLIED_V1` rows
    pub baseline_applied: usize,
    /// Candidate `PENALTY_APPLIED_V1` rows
    pub candidate_applied: usize,
}

impl PenaltyParity {
    /// Compare penalty behaviour
    #[must_use]
    pub fn evaluate(modes: (FeatureMode, FeatureMode), baseline: &RunAnalysis, candidate: &RunAnalysis) -> Self {
        let (base_mode, cand_mode) = modes;
        let base_seqs = &baseline.penalty_seqs;
        let cand_seqs = &candidate.penalty_seqs;

        let hint = mode_change_hint(modes, cand_seqs.len()).or_else(|| {
            if base_mode != FeatureMode::Active || cand_mode != FeatureMode::Active {
                return None;
            }
            first_divergence(base_seqs, cand_seqs).map(|i| {
                format!(
                    "penalty seq: baseline={} candidate={}",
                    base_seqs.get(i).copied().unwrap_or_default(),
                    cand_seqs.get(i).copied().unwrap_or_default()
                )
            })
        });

        Self {
            baseline_mode: base_mode,
            candidate_mode: cand_mode,
            parity: if hint.is_some() { ParityFlag::Mismatch } else { ParityFlag::Ok },
            reason: if hint.is_some() { PENALTY_MISMATCH } else { OK }.to_owned(),
            diff_hint: hint.unwrap_or_default(),
            baseline_applied: base_seqs.len(),
            candidate_applied: cand_seqs.len(),
        }
    }

    /// Whether the section passed
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.parity == ParityFlag::Ok
    }
}

/// Divergence caused by the mode change alone. Active to anything else is a
/// downgrade; anything to active is benign only with zero applied events.
fn mode_change_hint(modes: (FeatureMode, FeatureMode), candidate_applied: usize) -> Option<String> {
    match modes {
        (FeatureMode::Active, cand) if cand != FeatureMode::Active => Some(format!("mode_downgrade active->{cand}")),
        (base, FeatureMode::Active) if base != FeatureMode::Active && candidate_applied > 0 => {
            Some(format!("{base}->active applied={candidate_applied}"))
        }
        _ => None,
    }
}

fn first_divergence<T: PartialEq>(a: &[T], b: &[T]) -> Option<usize> {
    (0..a.len().max(b.len())).find(|&i| a.get(i) != b.get(i))
}
