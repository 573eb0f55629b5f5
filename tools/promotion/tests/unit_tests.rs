//! Unit tests for the promotion gate

use async_trait::async_trait;
use promotion::{
    DETERMINISM_DIFF_FILE, Decision, DeterminismGate, EngineRunner, GateOptions, ProcessEngineRunner,
    PromotionError, RunLabel, RunOutcome, RunRequest,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use test_utils::*;

/// What a scripted run leaves behind
#[derive(Clone)]
struct Script {
    events: JournalBuilder,
    trades: Option<TradesBuilder>,
    exit_code: Option<i32>,
    spawns: bool,
}

impl Script {
    fn healthy() -> Self {
        Self {
            events: healthy_events(),
            trades: Some(healthy_trades()),
            exit_code: Some(0),
            spawns: true,
        }
    }

    fn with_events(mut self, events: JournalBuilder) -> Self {
        self.events = events;
        self
    }

    fn with_trades(mut self, trades: TradesBuilder) -> Self {
        self.trades = Some(trades);
        self
    }

    fn without_trades(mut self) -> Self {
        self.trades = None;
        self
    }

    fn unspawnable(mut self) -> Self {
        self.spawns = false;
        self
    }

    fn exiting(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }
}

/// Engine stand-in that writes canned journals
struct FakeRunner {
    scripts: HashMap<RunLabel, Script>,
    calls: Mutex<Vec<RunLabel>>,
}

impl FakeRunner {
    fn new(baseline: Script, candidate: Script) -> Self {
        Self::with_b(baseline, candidate.clone(), candidate)
    }

    fn with_b(baseline: Script, candidate_a: Script, candidate_b: Script) -> Self {
        let scripts = HashMap::from([
            (RunLabel::Baseline, baseline),
            (RunLabel::CandidateA, candidate_a),
            (RunLabel::CandidateB, candidate_b),
        ]);
        Self {
            scripts,
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl EngineRunner for FakeRunner {
    async fn run(&self, request: &RunRequest) -> promotion::Result<RunOutcome> {
        self.calls.lock().unwrap().push(request.label);
        let script = &self.scripts[&request.label];
        if !script.spawns {
            return Err(PromotionError::Spawn {
                engine: PathBuf::from("engine"),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "engine missing"),
            });
        }
        std::fs::create_dir_all(&request.scratch).unwrap();
        std::fs::write(request.events_path(), script.events.render()).unwrap();
        if let Some(trades) = &script.trades {
            std::fs::write(request.trades_path(), trades.render()).unwrap();
        }
        Ok(RunOutcome {
            exit_code: script.exit_code,
            timed_out: script.exit_code.is_none(),
            events: request.events_path(),
            trades: request.trades_path(),
        })
    }
}

/// Work directory holding both configs and the artifact root
struct Workspace {
    dir: TempDir,
    baseline: PathBuf,
    candidate: PathBuf,
}

impl Workspace {
    fn new(baseline: &Value, candidate: &Value) -> Self {
        let dir = TempDir::new().unwrap();
        let baseline = write_json(dir.path(), "baseline.json", baseline).unwrap();
        let candidate = write_json(dir.path(), "candidate.json", candidate).unwrap();
        Self { dir, baseline, candidate }
    }

    fn same() -> Self {
        let cfg = engine_config();
        Self::new(&cfg, &cfg)
    }

    fn options(&self) -> GateOptions {
        GateOptions {
            work_dir: self.artifacts(),
            ..GateOptions::default()
        }
    }

    fn artifacts(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    fn artifact_dirs(&self) -> Vec<PathBuf> {
        std::fs::read_dir(self.artifacts())
            .map(|rd| rd.filter_map(|e| e.ok().map(|e| e.path())).collect())
            .unwrap_or_default()
    }
}

fn with_flags(risk: &str, sentiment: &str, penalty: &str) -> Value {
    let mut cfg = engine_config();
    cfg["featureFlags"] = json!({ "risk": risk, "sentiment": sentiment, "penalty": penalty });
    cfg
}

async fn promote(ws: &Workspace, runner: FakeRunner) -> (promotion::PromotionResult, Vec<RunLabel>) {
    promote_with(ws, runner, ws.options()).await
}

async fn promote_with(
    ws: &Workspace,
    runner: FakeRunner,
    options: GateOptions,
) -> (promotion::PromotionResult, Vec<RunLabel>) {
    init_test_logging();
    let gate = DeterminismGate::new(runner, options);
    let result = gate.promote(&ws.baseline, &ws.candidate).await.unwrap();
    let calls = gate_calls(&gate);
    (result, calls)
}

fn gate_calls(gate: &DeterminismGate<FakeRunner>) -> Vec<RunLabel> {
    gate.runner().calls.lock().unwrap().clone()
}

mod ladder_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_identical_runs_are_accepted() {
        let ws = Workspace::same();
        let (result, calls) = promote(&ws, FakeRunner::new(Script::healthy(), Script::healthy())).await;

        assert!(result.accepted, "{}", result.human_summary());
        assert_eq!(result.reason, Decision::Accept);
        assert_eq!(result.exit_code(), 0);
        assert_eq!(calls, vec![RunLabel::Baseline, RunLabel::CandidateA, RunLabel::CandidateB]);
        assert!(result.determinism.events_match && result.determinism.trades_match);
        assert_upper_sha256(&result.determinism.events_hash_a);
        assert!(result.parity.checked);
        assert!(result.artifacts.is_none());
        assert!(ws.artifact_dirs().is_empty(), "artifacts should be cleaned up");
    }

    #[tokio::test]
    async fn test_result_line_shape() {
        let ws = Workspace::same();
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy(), Script::healthy())).await;
        let line: Value = serde_json::from_str(&result.to_json_line().unwrap()).unwrap();

        assert_eq!(line["type"], "PROMOTION_RESULT_V1");
        assert_eq!(line["reason"], "accept");
        assert_eq!(line["candidate"]["trades"], 1);
        assert_eq!(line["candidate"]["pnl"].to_string(), "0.20");
        assert_eq!(line["dataQa"]["candidate"]["passed"], true);
        assert_eq!(line["penalty"]["parity"], "ok");
    }

    #[tokio::test]
    async fn test_baseline_failure_stops_early() {
        let ws = Workspace::same();
        let runner = FakeRunner::new(Script::healthy().exiting(Some(3)), Script::healthy());
        let (result, calls) = promote(&ws, runner).await;

        assert_eq!(result.reason, Decision::BaselineRunFailed);
        assert_eq!(calls, vec![RunLabel::Baseline]);
        assert_eq!(result.baseline.as_ref().map(|f| f.exit_code), Some(Some(3)));
        assert_eq!(result.exit_code(), 2);
    }

    #[tokio::test]
    async fn test_candidate_timeout_rejects() {
        let ws = Workspace::same();
        let runner = FakeRunner::with_b(Script::healthy(), Script::healthy(), Script::healthy().exiting(None));
        let (result, calls) = promote(&ws, runner).await;

        assert_eq!(result.reason, Decision::CandidateRunFailed);
        assert_eq!(calls.len(), 3);
        assert!(ws.artifact_dirs().is_empty());
    }

    #[tokio::test]
    async fn test_candidate_verify_failure() {
        let ws = Workspace::same();
        let broken = healthy_events().event(
            T0,
            "INFO_RISK_EVAL_V1",
            json!({ "symbol": "EURUSD", "ts": T0 }),
        );
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy(), Script::healthy().with_events(broken))).await;
        assert_eq!(result.reason, Decision::VerifyFailed);
    }

    #[tokio::test]
    async fn test_baseline_verify_checked_first() {
        let ws = Workspace::same();
        let shadow_applied = healthy_events().event(
            T0,
            "INFO_SENTIMENT_APPLIED_V1",
            sentiment_applied_payload("EURUSD", 100, 50),
        );
        let bad = Script::healthy().with_events(shadow_applied);
        let (result, _) = promote(&ws, FakeRunner::new(bad.clone(), bad)).await;
        assert_eq!(result.reason, Decision::BaselineVerifyFailed);
    }

    #[tokio::test]
    async fn test_nondeterministic_candidate_keeps_artifacts() {
        let ws = Workspace::same();
        let drifted = Script::healthy().with_trades(TradesBuilder::new().trade("EURUSD", "0.21", "100"));
        let runner = FakeRunner::with_b(Script::healthy(), Script::healthy(), drifted);
        let (result, _) = promote(&ws, runner).await;

        assert_eq!(result.reason, Decision::DeterminismFailed);
        assert!(result.determinism.events_match);
        assert!(!result.determinism.trades_match);
        assert_ne!(result.determinism.trades_hash_a, result.determinism.trades_hash_b);

        let root = result.artifacts.clone().unwrap();
        assert!(root.join("candidate-b").join("trades.csv").is_file());
        let dump_path = result.determinism.diagnostic.clone().unwrap();
        assert_eq!(dump_path, root.join(DETERMINISM_DIFF_FILE));
        let dump = std::fs::read_to_string(dump_path).unwrap();
        assert!(dump.starts_with("[trades]"), "{dump}");
        assert!(dump.contains("first difference at line 2"));
        assert!(result.human_summary().contains("diagnostic:"));
    }

    #[tokio::test]
    async fn test_data_qa_failure() {
        let ws = Workspace::same();
        let qa = healthy_events().event(
            T0,
            "DATA_QA_SUMMARY_V1",
            json!({ "passed": false, "aborted": false, "issues": 4 }),
        );
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy(), Script::healthy().with_events(qa))).await;

        assert_eq!(result.reason, Decision::DataQaFailed);
        assert!(!result.data_qa.candidate.passed);
        assert!(result.data_qa.baseline.passed);
    }

    #[tokio::test]
    async fn test_risk_downgrade_rejected() {
        let ws = Workspace::new(&with_flags("active", "shadow", "off"), &with_flags("shadow", "shadow", "off"));
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy(), Script::healthy())).await;

        assert_eq!(result.reason, Decision::RiskMismatch);
        assert_eq!(result.risk.diff_hint, "mode_downgrade");
        assert!(result.human_summary().contains("risk: risk_mismatch (mode_downgrade)"));
    }

    #[tokio::test]
    async fn test_active_alert_divergence_rejected() {
        let ws = Workspace::same();
        let alerted = healthy_events()
            .event(T0, "INFO_RISK_EVAL_V1", risk_eval_payload("EURUSD", T0, 200))
            .event(T0, "ALERT_BLOCK_NET_EXPOSURE", guardrail_alert_payload("EURUSD"));
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy().with_events(alerted), Script::healthy())).await;

        assert_eq!(result.reason, Decision::RiskMismatch);
        assert_eq!(result.risk.diff_hint, "alert lines baseline=1 candidate=0");
        assert_eq!(result.risk.baseline.alerts, 1);
    }

    #[tokio::test]
    async fn test_trade_count_mismatch() {
        let ws = Workspace::same();
        let more = Script::healthy().with_trades(healthy_trades().trade("EURUSD", "0.10", "100"));
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy(), more)).await;
        assert_eq!(result.reason, Decision::TradeCountMismatch);
    }

    #[tokio::test]
    async fn test_worse_pnl_rejected() {
        let ws = Workspace::same();
        let worse = Script::healthy().with_trades(TradesBuilder::new().trade("EURUSD", "0.10", "100"));
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy(), worse)).await;
        assert_eq!(result.reason, Decision::PnlWorsened);
        assert!(result.to_json_line().unwrap().contains(r#""reason":"PnL worsened""#));
    }

    #[tokio::test]
    async fn test_deeper_drawdown_rejected() {
        let ws = Workspace::same();
        let base = Script::healthy().with_trades(
            TradesBuilder::new().trade("EURUSD", "0.30", "100").trade("EURUSD", "-0.10", "100"),
        );
        let cand = Script::healthy().with_trades(
            TradesBuilder::new().trade("EURUSD", "-0.20", "100").trade("EURUSD", "0.40", "100"),
        );
        let (result, _) = promote(&ws, FakeRunner::new(base, cand)).await;

        assert_eq!(result.reason, Decision::MaxDrawdownWorsened);
        let cand_facts = result.candidate.unwrap();
        assert_eq!(cand_facts.max_dd.to_string(), "0.20");
    }

    #[tokio::test]
    async fn test_sentiment_upgrade_with_effect_rejected() {
        let ws = Workspace::new(&with_flags("active", "shadow", "off"), &with_flags("active", "active", "off"));
        let applied = healthy_events().event(
            T0,
            "INFO_SENTIMENT_APPLIED_V1",
            sentiment_applied_payload("EURUSD", 100, 50),
        );
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy(), Script::healthy().with_events(applied))).await;

        assert_eq!(result.reason, Decision::SentimentMismatch);
        assert_eq!(result.sentiment.diff_hint, "shadow->active applied=1");
    }

    #[tokio::test]
    async fn test_penalty_sequence_hint() {
        let flags = with_flags("active", "shadow", "active");
        let ws = Workspace::new(&flags, &flags);
        let penalised = healthy_events().event(T0, "PENALTY_APPLIED_V1", penalty_payload("EURUSD"));
        let (result, _) = promote(&ws, FakeRunner::new(Script::healthy().with_events(penalised), Script::healthy())).await;

        assert_eq!(result.reason, Decision::PenaltyMismatch);
        assert_eq!(result.penalty.diff_hint, "penalty seq: baseline=3 candidate=0");
    }

    #[tokio::test]
    async fn test_parity_mismatch_and_override() {
        let extra = healthy_events().event(T0, "RISK_PROBE_V1", risk_probe_payload("EURUSD"));
        let cand = Script::healthy().with_events(extra);

        let ws = Workspace::same();
        let (strict, _) = promote(&ws, FakeRunner::new(Script::healthy(), cand.clone())).await;
        assert_eq!(strict.reason, Decision::ParityMismatch);
        assert!(!strict.parity.report.as_ref().unwrap().events.matched);

        let ws = Workspace::same();
        let options = GateOptions {
            allow_parity_mismatch: true,
            ..ws.options()
        };
        let (relaxed, _) = promote_with(&ws, FakeRunner::new(Script::healthy(), cand), options).await;
        assert!(relaxed.accepted);
        assert!(relaxed.parity.overridden);
    }

    #[tokio::test]
    async fn test_runner_error_removes_artifacts() {
        init_test_logging();
        let ws = Workspace::same();
        let runner = FakeRunner::with_b(Script::healthy(), Script::healthy(), Script::healthy().unspawnable());
        let gate = DeterminismGate::new(runner, ws.options());
        let err = gate.promote(&ws.baseline, &ws.candidate).await.unwrap_err();

        assert!(matches!(err, PromotionError::Spawn { .. }));
        assert_eq!(gate_calls(&gate).len(), 3);
        assert!(ws.artifact_dirs().is_empty(), "artifacts left behind: {:?}", ws.artifact_dirs());
    }

    #[tokio::test]
    async fn test_unreadable_candidate_trades_fail_verification() {
        let ws = Workspace::same();
        let runner = FakeRunner::new(Script::healthy(), Script::healthy().without_trades());
        let (result, _) = promote(&ws, runner).await;

        assert_eq!(result.reason, Decision::VerifyFailed);
        assert!(ws.artifact_dirs().is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_baseline_trades_fail_baseline_verification() {
        let ws = Workspace::same();
        let runner = FakeRunner::new(Script::healthy().without_trades(), Script::healthy());
        let (result, _) = promote(&ws, runner).await;
        assert_eq!(result.reason, Decision::BaselineVerifyFailed);
    }

    #[tokio::test]
    async fn test_missing_config_is_an_error() {
        let ws = Workspace::same();
        let gate = DeterminismGate::new(FakeRunner::new(Script::healthy(), Script::healthy()), ws.options());
        let err = gate
            .promote(&ws.baseline, &ws.dir.path().join("absent.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PromotionError::Config { .. }));
        assert!(gate_calls(&gate).is_empty());
    }
}

mod process_runner_tests {
    use super::*;
    use std::time::Duration;

    fn request(dir: &Path) -> RunRequest {
        RunRequest {
            label: RunLabel::CandidateA,
            config: dir.join("cfg.json"),
            run_id: "candidate-a-ABC".to_owned(),
            scratch: dir.join("scratch"),
        }
    }

    #[test]
    fn test_exit_code_and_logs_captured() {
        let dir = TempDir::new().unwrap();
        // $0 is the script name, the gate arguments follow
        let runner = ProcessEngineRunner::new("sh").with_args([
            "-c",
            r#"echo "run $4"; out="$6"; printf 'x\n' > "$out/events.csv"; exit 7"#,
            "engine",
        ]);
        let req = request(dir.path());
        let outcome = tokio_test::block_on(runner.run(&req)).unwrap();

        assert_eq!(outcome.exit_code, Some(7));
        assert!(!outcome.timed_out);
        assert!(!outcome.succeeded());
        assert!(outcome.events.is_file());
        let stdout = std::fs::read_to_string(req.scratch.join("engine.stdout.log")).unwrap();
        assert_eq!(stdout.trim(), "run candidate-a-ABC");
    }

    #[tokio::test]
    async fn test_slow_engine_is_killed() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessEngineRunner::new("sh")
            .with_args(["-c", "sleep 30", "engine"])
            .with_timeout(Duration::from_millis(200));
        let outcome = runner.run(&request(dir.path())).await.unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.exit_code, None);
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn test_missing_engine_fails_to_spawn() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessEngineRunner::new(dir.path().join("no-such-engine"));
        let err = runner.run(&request(dir.path())).await.unwrap_err();
        assert!(matches!(err, PromotionError::Spawn { .. }));
    }
}
