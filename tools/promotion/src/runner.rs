//! Engine runner seam
//!
//! The gate never talks to the engine directly. It hands a [`RunRequest`] to
//! an [`EngineRunner`], which produces `events.csv` and `trades.csv` inside the
//! request's scratch directory.

use crate::error::{PromotionError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Default wall-clock limit per run
pub const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(600);

/// Events journal file name inside a scratch directory
pub const EVENTS_FILE: &str = "events.csv";
/// Trades file name inside a scratch directory
pub const TRADES_FILE: &str = "trades.csv";
/// Captured engine stdout
pub const STDOUT_LOG: &str = "engine.stdout.log";
/// Captured engine stderr
pub const STDERR_LOG: &str = "engine.stderr.log";

/// Which of the three gate runs this is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunLabel {
    /// Baseline configuration
    Baseline,
    /// First candidate run
    CandidateA,
    /// Second candidate run, compared against the first for determinism
    CandidateB,
}

impl RunLabel {
    /// Directory and run-id prefix
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Baseline => "baseline",
            Self::CandidateA => "candidate-a",
            Self::CandidateB => "candidate-b",
        }
    }
}

impl fmt::Display for RunLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One engine invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Which gate run
    pub label: RunLabel,
    /// Configuration document
    pub config: PathBuf,
    /// Unique run identifier
    pub run_id: String,
    /// Isolated output directory
    pub scratch: PathBuf,
}

impl RunRequest {
    /// Expected events journal
    #[must_use]
    pub fn events_path(&self) -> PathBuf {
        self.scratch.join(EVENTS_FILE)
    }

    /// Expected trades file
    #[must_use]
    pub fn trades_path(&self) -> PathBuf {
        self.scratch.join(TRADES_FILE)
    }
}

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Process exit code; `None` when killed or terminated by a signal
    pub exit_code: Option<i32>,
    /// Killed after exceeding the timeout
    pub timed_out: bool,
    /// Events journal
    pub events: PathBuf,
    /// Trades file
    pub trades: PathBuf,
}

impl RunOutcome {
    /// Exited 0 within the time limit and left both output files behind
    #[must_use]
    pub fn succeeded(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0) && self.events.is_file() && self.trades.is_file()
    }
}

/// Runs one configuration into a scratch directory
#[async_trait]
pub trait EngineRunner: Send + Sync {
    /// Execute the run. `Err` only for failures to start; a crashed or slow
    /// engine is reported through [`RunOutcome`].
    async fn run(&self, request: &RunRequest) -> Result<RunOutcome>;
}

/// Spawns the engine executable as a child process
#[derive(Debug, Clone)]
pub struct ProcessEngineRunner {
    engine: PathBuf,
    leading_args: Vec<String>,
    timeout: Duration,
}

impl ProcessEngineRunner {
    /// Runner for `engine` with the default timeout
    pub fn new(engine: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            leading_args: Vec::new(),
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    /// Arguments placed before `--config`
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.leading_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Per-run wall-clock limit
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn log_file(scratch: &Path, name: &str) -> Result<File> {
        let path = scratch.join(name);
        File::create(&path).map_err(PromotionError::artifact(path))
    }
}

#[async_trait]
impl EngineRunner for ProcessEngineRunner {
    async fn run(&self, request: &RunRequest) -> Result<RunOutcome> {
        tokio::fs::create_dir_all(&request.scratch)
            .await
            .map_err(PromotionError::artifact(&request.scratch))?;
        let stdout = Self::log_file(&request.scratch, STDOUT_LOG)?;
        let stderr = Self::log_file(&request.scratch, STDERR_LOG)?;

        debug!(label = %request.label, engine = %self.engine.display(), "spawning engine");
        let mut child = Command::new(&self.engine)
            .args(&self.leading_args)
            .arg("--config")
            .arg(&request.config)
            .arg("--run-id")
            .arg(&request.run_id)
            .arg("--out")
            .arg(&request.scratch)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PromotionError::Spawn {
                engine: self.engine.clone(),
                source,
            })?;

        let (exit_code, timed_out) = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => {
                let status = status.map_err(|source| PromotionError::Spawn {
                    engine: self.engine.clone(),
                    source,
                })?;
                (status.code(), false)
            }
            Err(_) => {
                warn!(label = %request.label, timeout = ?self.timeout, "engine run timed out, killing");
                if let Err(e) = child.kill().await {
                    warn!(label = %request.label, "failed to kill engine: {e}");
                }
                (None, true)
            }
        };

        info!(label = %request.label, run_id = %request.run_id, exit_code = ?exit_code, timed_out, "engine run finished");
        Ok(RunOutcome {
            exit_code,
            timed_out,
            events: request.events_path(),
            trades: request.trades_path(),
        })
    }
}
