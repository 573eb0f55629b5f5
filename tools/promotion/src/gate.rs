//! Determinism gate: three engine runs and the accept/reject ladder
//!
//! The baseline runs once and the candidate twice, each into its own scratch
//! directory under a per-promotion artifact root. Rungs are evaluated in a
//! fixed order and the first one that fires is the rejection reason. The
//! artifact root is removed afterwards unless the two candidate runs
//! disagreed, in which case it is kept with a `determinism_diff.txt` dump.

use crate::analysis::{RunAnalysis, RunFacts, analyze_run};
use crate::checks::{PenaltyParity, RiskParity, SentimentParity};
use crate::error::{PromotionError, Result};
use crate::result::{Decision, DeterminismSection, FinalParity, PromotionResult};
use crate::runner::{EngineRunner, RunLabel, RunOutcome, RunRequest};
use chrono::Utc;
use common::SCHEMA_VERSION;
use journal_verify::parity::{context_dump, normalize_events, normalize_trades};
use journal_verify::{ParityReport, StrictOptions, parity_snapshot, verify_strict};
use risk_manager::EngineConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Diagnostic dump kept after a determinism failure
pub const DETERMINISM_DIFF_FILE: &str = "determinism_diff.txt";

/// Lines of context around the first differing line in the dump
const DIFF_CONTEXT_LINES: usize = 3;

/// Gate settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateOptions {
    /// Parent of the per-promotion artifact directories
    pub work_dir: PathBuf,
    /// Lowest acceptable journal schema
    pub minimum_schema: String,
    /// Skip the final baseline-versus-candidate parity rung
    pub allow_parity_mismatch: bool,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("artifacts"),
            minimum_schema: SCHEMA_VERSION.to_owned(),
            allow_parity_mismatch: false,
        }
    }
}

/// A loaded configuration and where it came from
struct Side<'a> {
    path: &'a Path,
    config: EngineConfig,
}

impl<'a> Side<'a> {
    fn load(path: &'a Path) -> Result<Self> {
        let config = EngineConfig::load(path).map_err(|source| PromotionError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { path, config })
    }

    fn short_hash(&self) -> &str {
        let hash = &self.config.config_hash;
        hash.get(..12).unwrap_or(hash)
    }
}

/// Finished ladder plus whether the artifacts must be kept
struct Verdict {
    result: PromotionResult,
    retain: bool,
}

impl Verdict {
    fn reject(result: PromotionResult, decision: Decision) -> Self {
        warn!(reason = %decision, "promotion rejected");
        Self {
            result: result.decide(decision),
            retain: false,
        }
    }
}

/// Runs the engine and decides whether a candidate may be promoted
#[derive(Debug)]
pub struct DeterminismGate<R> {
    runner: R,
    options: GateOptions,
}

impl<R: EngineRunner> DeterminismGate<R> {
    /// Gate driving `runner`
    pub const fn new(runner: R, options: GateOptions) -> Self {
        Self { runner, options }
    }

    /// Runner in use
    pub const fn runner(&self) -> &R {
        &self.runner
    }

    /// Settings in use
    pub const fn options(&self) -> &GateOptions {
        &self.options
    }

    /// Evaluate `candidate` against `baseline`
    pub async fn promote(&self, baseline: &Path, candidate: &Path) -> Result<PromotionResult> {
        let baseline = Side::load(baseline)?;
        let candidate = Side::load(candidate)?;

        let root = self.options.work_dir.join(format!(
            "promote-{}-{}",
            candidate.short_hash(),
            Utc::now().format("%Y%m%dT%H%M%S%3fZ")
        ));
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(PromotionError::artifact(&root))?;
        info!(root = %root.display(), "promotion started");

        let result = PromotionResult::new(
            baseline.config.config_hash.clone(),
            candidate.config.config_hash.clone(),
        );
        let result = match self.ladder(&baseline, &candidate, &root, result).await {
            Ok(Verdict {
                mut result,
                retain: true,
            }) => {
                warn!(root = %root.display(), "artifacts retained for diagnosis");
                result.artifacts = Some(root);
                result
            }
            other => {
                if let Err(e) = tokio::fs::remove_dir_all(&root).await {
                    warn!(root = %root.display(), "failed to remove artifacts: {e}");
                }
                other?.result
            }
        };
        info!(accepted = result.accepted, reason = %result.reason, "promotion finished");
        Ok(result)
    }

    async fn execute(&self, label: RunLabel, side: &Side<'_>, root: &Path) -> Result<RunOutcome> {
        let request = RunRequest {
            label,
            config: side.path.to_path_buf(),
            run_id: format!("{label}-{}", side.short_hash()),
            scratch: root.join(label.as_str()),
        };
        info!(%label, config = %side.path.display(), "engine run");
        self.runner.run(&request).await
    }

    fn strict_ok(&self, run: &RunOutcome, side: &Side<'_>) -> Result<bool> {
        let opts = StrictOptions {
            minimum_schema: self.options.minimum_schema.clone(),
            sentiment_mode: Some(side.config.sentiment_mode),
            lenient_order: false,
        };
        let report = match verify_strict(&run.events, &run.trades, &opts) {
            Ok(report) => report,
            Err(e) if e.is_fatal() => {
                warn!(events = %run.events.display(), "journals unreadable: {e}");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if !report.is_ok() {
            warn!(violations = report.violations.len(), "{}", report.human_summary());
        }
        Ok(report.is_ok())
    }

    #[allow(clippy::too_many_lines)]
    async fn ladder(
        &self,
        baseline: &Side<'_>,
        candidate: &Side<'_>,
        root: &Path,
        mut result: PromotionResult,
    ) -> Result<Verdict> {
        // Rung 1: every run must exit cleanly, fail-fast in run order
        let base_run = self.execute(RunLabel::Baseline, baseline, root).await?;
        if !base_run.succeeded() {
            result.baseline = Some(failed_facts(&base_run));
            return Ok(Verdict::reject(result, Decision::BaselineRunFailed));
        }
        let run_a = self.execute(RunLabel::CandidateA, candidate, root).await?;
        if !run_a.succeeded() {
            result.candidate = Some(failed_facts(&run_a));
            return Ok(Verdict::reject(result, Decision::CandidateRunFailed));
        }
        let run_b = self.execute(RunLabel::CandidateB, candidate, root).await?;
        if !run_b.succeeded() {
            result.candidate = Some(failed_facts(&run_b));
            return Ok(Verdict::reject(result, Decision::CandidateRunFailed));
        }

        // Rung 2: strict verification
        if !self.strict_ok(&base_run, baseline)? {
            return Ok(Verdict::reject(result, Decision::BaselineVerifyFailed));
        }
        if !self.strict_ok(&run_a, candidate)? {
            return Ok(Verdict::reject(result, Decision::VerifyFailed));
        }
        info!("strict verification passed");

        let base = analyze_run(&base_run.events, &base_run.trades, base_run.exit_code)?;
        let cand = analyze_run(&run_a.events, &run_a.trades, run_a.exit_code)?;
        result.baseline = Some(base.facts.clone());
        result.candidate = Some(cand.facts.clone());
        result.data_qa.baseline = base.data_qa;
        result.data_qa.candidate = cand.data_qa;
        fill_parity_sections(&mut result, baseline, candidate, &base, &cand);

        // Rung 3: candidate A and B must be byte-identical after normalisation
        let determinism = parity_snapshot(&run_a.events, &run_b.events, Some((&run_a.trades, &run_b.trades)))?;
        result.determinism = determinism_section(&determinism);
        if !determinism.is_match() {
            let dump = root.join(DETERMINISM_DIFF_FILE);
            write_determinism_dump(&dump, &run_a, &run_b, &determinism).await?;
            result.determinism.diagnostic = Some(dump);
            let mut verdict = Verdict::reject(result, Decision::DeterminismFailed);
            verdict.retain = true;
            return Ok(verdict);
        }
        info!("candidate runs are deterministic");

        // Rung 4: data QA
        if cand.data_qa.failed() {
            return Ok(Verdict::reject(result, Decision::DataQaFailed));
        }

        // Rungs 5-7: risk mode downgrade, shadow to active divergence, alert parity
        if !result.risk.parity {
            return Ok(Verdict::reject(result, Decision::RiskMismatch));
        }

        // Rungs 8-10: trade count, PnL and drawdown regressions
        if base.facts.trades != cand.facts.trades {
            return Ok(Verdict::reject(result, Decision::TradeCountMismatch));
        }
        if cand.facts.pnl < base.facts.pnl {
            return Ok(Verdict::reject(result, Decision::PnlWorsened));
        }
        if cand.facts.max_dd > base.facts.max_dd {
            return Ok(Verdict::reject(result, Decision::MaxDrawdownWorsened));
        }

        // Rung 11: sentiment and penalty parity
        if !result.sentiment.parity {
            return Ok(Verdict::reject(result, Decision::SentimentMismatch));
        }
        if !result.penalty.is_ok() {
            return Ok(Verdict::reject(result, Decision::PenaltyMismatch));
        }

        // Rung 12: full baseline versus candidate parity
        let overridden = self.options.allow_parity_mismatch;
        let report = parity_snapshot(&base_run.events, &run_a.events, Some((&base_run.trades, &run_a.trades)))?;
        let matched = report.is_match();
        result.parity = FinalParity {
            checked: true,
            overridden,
            report: Some(report),
        };
        if !matched && !overridden {
            return Ok(Verdict::reject(result, Decision::ParityMismatch));
        }
        if !matched {
            warn!("baseline and candidate outputs differ; mismatch allowed");
        }

        Ok(Verdict {
            result: result.decide(Decision::Accept),
            retain: false,
        })
    }
}

fn failed_facts(run: &RunOutcome) -> RunFacts {
    RunFacts {
        exit_code: run.exit_code,
        ..RunFacts::default()
    }
}

fn fill_parity_sections(
    result: &mut PromotionResult,
    baseline: &Side<'_>,
    candidate: &Side<'_>,
    base: &RunAnalysis,
    cand: &RunAnalysis,
) {
    let (b, c) = (&baseline.config, &candidate.config);
    result.risk = RiskParity::evaluate((b.risk_mode, c.risk_mode), base, cand, c.risk.has_zero_exposure_cap());
    result.sentiment = SentimentParity::evaluate((b.sentiment_mode, c.sentiment_mode), base, cand);
    result.penalty = PenaltyParity::evaluate((b.penalty_mode, c.penalty_mode), base, cand);
}

fn determinism_section(report: &ParityReport) -> DeterminismSection {
    let trades = report.trades.as_ref();
    DeterminismSection {
        checked: true,
        events_match: report.events.matched,
        trades_match: trades.is_none_or(|t| t.matched),
        events_hash_a: report.events.hash_a.clone(),
        events_hash_b: report.events.hash_b.clone(),
        trades_hash_a: trades.map(|t| t.hash_a.clone()).unwrap_or_default(),
        trades_hash_b: trades.map(|t| t.hash_b.clone()).unwrap_or_default(),
        diagnostic: None,
    }
}

async fn write_determinism_dump(
    path: &Path,
    run_a: &RunOutcome,
    run_b: &RunOutcome,
    report: &ParityReport,
) -> Result<()> {
    let mut sections = Vec::new();
    if !report.events.matched {
        let a = normalize_events(&run_a.events)?;
        let b = normalize_events(&run_b.events)?;
        sections.push(context_dump("events", &a, &b, &report.events, DIFF_CONTEXT_LINES));
    }
    if let Some(trades) = report.trades.as_ref().filter(|t| !t.matched) {
        let a = normalize_trades(&run_a.trades)?;
        let b = normalize_trades(&run_b.trades)?;
        sections.push(context_dump("trades", &a, &b, trades, DIFF_CONTEXT_LINES));
    }
    let mut text = sections.join("\n\n");
    text.push('\n');
    tokio::fs::write(path, text)
        .await
        .map_err(PromotionError::artifact(path))?;
    warn!(path = %path.display(), "determinism diff written");
    Ok(())
}
