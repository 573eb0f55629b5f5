//! riskgate - journal verification and configuration promotion

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod settings;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use common::FeatureMode;
use journal_verify::diff::SUMMARY_LIMIT;
use journal_verify::{
    DeepOptions, EXIT_FATAL, LenientOptions, StrictOptions, VerifyError, diff_journals, infer_default_keys,
    parity_snapshot, verify_deep, verify_journal, verify_strict,
};
use promotion::{DeterminismGate, GateOptions, ProcessEngineRunner};
use risk_manager::EngineConfig;
use settings::ToolSettings;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use storage::dataversion;
use tracing::{debug, error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "riskgate=info,promotion=info,journal_verify=info";
const QUIET_FILTER: &str = "warn";

#[derive(Parser)]
#[command(name = "riskgate")]
#[command(about = "Journal verification, diffing and configuration promotion")]
#[command(version)]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite-key diff of two journals
    Diff {
        /// Journal A
        #[arg(long)]
        a: PathBuf,
        /// Journal B
        #[arg(long)]
        b: PathBuf,
        /// Key fields, comma separated; inferred from journal A when omitted
        #[arg(long, value_delimiter = ',')]
        keys: Vec<String>,
        /// List repeated keys as DUP entries
        #[arg(long)]
        report_duplicates: bool,
    },
    /// Verify a journal (lenient unless a mode is given)
    #[command(args_conflicts_with_subcommands = true)]
    Verify {
        #[command(subcommand)]
        mode: Option<VerifyMode>,
        #[command(flatten)]
        lenient: LenientArgs,
    },
    /// Decide whether a candidate configuration may replace the baseline
    Promote {
        /// Baseline configuration
        #[arg(long)]
        baseline: PathBuf,
        /// Candidate configuration
        #[arg(long)]
        candidate: PathBuf,
        /// Artifact root
        #[arg(long)]
        workdir: Option<PathBuf>,
        /// Accept even when baseline and candidate outputs differ
        #[arg(long)]
        allow_parity_mismatch: bool,
        /// Engine executable
        #[arg(long)]
        engine: Option<PathBuf>,
        /// Per-run timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Print only the result line
        #[arg(long)]
        json: bool,
    },
    /// Hash the input data files named by a configuration
    Dataversion {
        /// Engine configuration
        #[arg(long)]
        config: PathBuf,
        /// Also write the hash to this file
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print each file with its row count
        #[arg(long)]
        echo_rows: bool,
    },
}

#[derive(Args)]
struct LenientArgs {
    /// Events journal
    #[arg(long)]
    file: Option<PathBuf>,
    #[command(flatten)]
    common: CommonVerifyArgs,
}

#[derive(Args)]
struct CommonVerifyArgs {
    /// Print the JSON report
    #[arg(long)]
    json: bool,
    /// Issue cap for the lenient pass
    #[arg(long)]
    max_errors: Option<usize>,
    /// Report repeated bar keys
    #[arg(long)]
    report_duplicates: bool,
}

#[derive(Subcommand)]
enum VerifyMode {
    /// Ordering, field and trade cross-checks
    Strict {
        #[command(flatten)]
        pair: JournalPair,
        /// Print the JSON report
        #[arg(long)]
        json: bool,
        /// Required predecessors may appear anywhere earlier in the bar group
        #[arg(long)]
        lenient_order: bool,
    },
    /// Lenient and strict passes plus statistics
    Deep {
        #[command(flatten)]
        pair: JournalPair,
        #[command(flatten)]
        common: CommonVerifyArgs,
    },
    /// Canonical hash comparison of two runs
    Parity {
        /// Events journal A
        #[arg(long)]
        events_a: PathBuf,
        /// Events journal B
        #[arg(long)]
        events_b: PathBuf,
        /// Trades file A
        #[arg(long, requires = "trades_b")]
        trades_a: Option<PathBuf>,
        /// Trades file B
        #[arg(long, requires = "trades_a")]
        trades_b: Option<PathBuf>,
        /// Print the JSON report
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct JournalPair {
    /// Events journal
    #[arg(long)]
    events: PathBuf,
    /// Trades file
    #[arg(long)]
    trades: PathBuf,
    /// Schema version to check against
    #[arg(long)]
    schema: Option<String>,
    /// Sentiment mode the run used
    #[arg(long, value_parser = parse_mode)]
    sentiment_mode: Option<FeatureMode>,
}

#[allow(clippy::unnecessary_wraps)]
fn parse_mode(raw: &str) -> std::result::Result<FeatureMode, String> {
    Ok(FeatureMode::parse_lenient(raw))
}

fn init_logging(quiet: bool) {
    let default = if quiet { QUIET_FILTER } else { DEFAULT_FILTER };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(true))
        .init();
}

/// Print the report and pass its exit code through
fn emit(json: bool, to_json: impl FnOnce() -> journal_verify::Result<String>, human: String, code: i32) -> Result<i32> {
    if json {
        println!("{}", to_json()?);
    } else {
        println!("{human}");
    }
    Ok(code)
}

fn run_diff(a: &Path, b: &Path, keys: Vec<String>, report_duplicates: bool) -> Result<i32> {
    let keys = if keys.is_empty() { infer_default_keys(a)? } else { keys };
    debug!(?keys, "diff keys");
    let outcome = diff_journals(a, b, &keys, report_duplicates)?;
    println!("{}", outcome.summary(SUMMARY_LIMIT));
    Ok(outcome.exit_code())
}

fn run_verify(mode: Option<VerifyMode>, lenient: LenientArgs, settings: &ToolSettings) -> Result<i32> {
    match mode {
        None => {
            let Some(file) = lenient.file else {
                bail!("verify needs --file or a mode (strict, deep, parity)");
            };
            let opts = LenientOptions {
                expected_schema: settings.schema_version.clone(),
                max_errors: lenient.common.max_errors.unwrap_or(settings.max_errors),
                report_duplicates: lenient.common.report_duplicates,
            };
            let report = verify_journal(&file, &opts)?;
            emit(lenient.common.json, || report.to_json(), report.human_summary(), report.exit_code())
        }
        Some(VerifyMode::Strict { pair, json, lenient_order }) => {
            let opts = StrictOptions {
                minimum_schema: pair.schema.unwrap_or_else(|| settings.schema_version.clone()),
                sentiment_mode: pair.sentiment_mode,
                lenient_order,
            };
            let report = verify_strict(&pair.events, &pair.trades, &opts)?;
            emit(json, || report.to_json(), report.human_summary(), report.exit_code())
        }
        Some(VerifyMode::Deep { pair, common }) => {
            let schema = pair.schema.unwrap_or_else(|| settings.schema_version.clone());
            let mut opts = DeepOptions::for_schema(&schema);
            opts.lenient.max_errors = common.max_errors.unwrap_or(settings.max_errors);
            opts.lenient.report_duplicates = common.report_duplicates;
            opts.strict.sentiment_mode = pair.sentiment_mode;
            let report = verify_deep(&pair.events, &pair.trades, &opts)?;
            emit(common.json, || report.to_json(), report.human_summary(), report.exit_code())
        }
        Some(VerifyMode::Parity {
            events_a,
            events_b,
            trades_a,
            trades_b,
            json,
        }) => {
            let trades = trades_a.as_deref().zip(trades_b.as_deref());
            let report = parity_snapshot(&events_a, &events_b, trades)?;
            emit(json, || report.to_json(), report.human_summary(), report.exit_code())
        }
    }
}

struct PromoteArgs {
    baseline: PathBuf,
    candidate: PathBuf,
    workdir: Option<PathBuf>,
    allow_parity_mismatch: bool,
    engine: Option<PathBuf>,
    timeout_secs: Option<u64>,
    json: bool,
}

async fn run_promote(args: PromoteArgs, settings: &ToolSettings) -> Result<i32> {
    let Some(engine) = args.engine.or_else(|| settings.engine.clone()) else {
        bail!("no engine configured: pass --engine or set engine in riskgate.toml");
    };
    let timeout = args
        .timeout_secs
        .map_or_else(|| settings.run_timeout(), std::time::Duration::from_secs);
    let runner = ProcessEngineRunner::new(engine)
        .with_args(settings.engine_args.iter().cloned())
        .with_timeout(timeout);
    let options = GateOptions {
        work_dir: args.workdir.unwrap_or_else(|| settings.artifacts_dir.clone()),
        minimum_schema: settings.schema_version.clone(),
        allow_parity_mismatch: args.allow_parity_mismatch,
    };

    let gate = DeterminismGate::new(runner, options);
    let result = gate
        .promote(&args.baseline, &args.candidate)
        .await
        .context("promotion did not reach a decision")?;

    println!("{}", result.to_json_line()?);
    if !args.json {
        println!("{}", result.human_summary());
    }
    Ok(result.exit_code())
}

fn run_dataversion(config: &Path, out: Option<&Path>, echo_rows: bool) -> Result<i32> {
    let cfg = EngineConfig::load(config).with_context(|| format!("loading {}", config.display()))?;
    let base_dir = config.parent().unwrap_or_else(|| Path::new("."));
    let files = cfg.data_files(base_dir);
    info!(files = files.len(), "hashing data files");

    let version = dataversion::compute(&files)?;
    let mut text = String::new();
    if echo_rows {
        for file in &version.files {
            text.push_str(&format!("{} rows={}\n", file.path, file.rows));
        }
    }
    text.push_str(&version.hash);
    println!("{text}");

    if let Some(out) = out {
        std::fs::write(out, format!("{}\n", version.hash)).with_context(|| format!("writing {}", out.display()))?;
    }
    Ok(0)
}

async fn run(cli: Cli) -> Result<i32> {
    let settings = ToolSettings::load().context("loading riskgate settings")?;
    debug!(?settings, "settings loaded");

    match cli.command {
        Commands::Diff {
            a,
            b,
            keys,
            report_duplicates,
        } => run_diff(&a, &b, keys, report_duplicates),
        Commands::Verify { mode, lenient } => run_verify(mode, lenient, &settings),
        Commands::Promote {
            baseline,
            candidate,
            workdir,
            allow_parity_mismatch,
            engine,
            timeout_secs,
            json,
        } => {
            let args = PromoteArgs {
                baseline,
                candidate,
                workdir,
                allow_parity_mismatch,
                engine,
                timeout_secs,
                json,
            };
            run_promote(args, &settings).await
        }
        Commands::Dataversion { config, out, echo_rows } => run_dataversion(&config, out.as_deref(), echo_rows),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<VerifyError>().map_or(EXIT_FATAL, VerifyError::exit_code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("ERROR: {e:#}");
            exit_code_for(&e)
        }
    };
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verify_modes_parse() {
        let cli = Cli::try_parse_from(["riskgate", "verify", "--file", "events.csv", "--max-errors", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Verify { mode: None, .. }));

        let cli = Cli::try_parse_from([
            "riskgate",
            "verify",
            "strict",
            "--events",
            "e.csv",
            "--trades",
            "t.csv",
            "--schema",
            "1.3.0",
            "--lenient-order",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Verify {
                mode: Some(VerifyMode::Strict { lenient_order: true, .. }),
                ..
            }
        ));
    }

    #[test]
    fn test_parity_trades_come_in_pairs() {
        let res = Cli::try_parse_from([
            "riskgate",
            "verify",
            "parity",
            "--events-a",
            "a.csv",
            "--events-b",
            "b.csv",
            "--trades-a",
            "ta.csv",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_diff_keys_split_on_comma() {
        let cli = Cli::try_parse_from(["riskgate", "diff", "--a", "a", "--b", "b", "--keys", "utc_ts,event_type"]).unwrap();
        let Commands::Diff { keys, .. } = cli.command else {
            panic!("expected diff");
        };
        assert_eq!(keys, vec!["utc_ts".to_owned(), "event_type".to_owned()]);
    }

    #[test]
    fn test_dataversion_echoes_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("instruments.csv"), "sym\nEURUSD\n").unwrap();
        let cfg = dir.path().join("cfg.json");
        std::fs::write(
            &cfg,
            r#"{"data":{"instrumentsFile":"instruments.csv","ticks":{"EURUSD":"missing.csv"}}}"#,
        )
        .unwrap();
        let out = dir.path().join("dv.txt");
        assert_eq!(run_dataversion(&cfg, Some(&out), true).unwrap(), 0);
        let written = std::fs::read_to_string(out).unwrap();
        assert_eq!(written.trim().len(), 64);
    }
}
