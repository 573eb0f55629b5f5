//! Tool settings layered from `riskgate.toml` and `RISKGATE_*` variables

use common::SCHEMA_VERSION;
use journal_verify::lenient::DEFAULT_MAX_ERRORS;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Settings file looked up in the working directory, extension optional
pub const SETTINGS_FILE: &str = "riskgate";
/// Environment variable prefix
pub const ENV_PREFIX: &str = "RISKGATE";

/// Defaults for the subcommands; command-line flags take precedence
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// Engine executable used by `promote`
    pub engine: Option<PathBuf>,
    /// Arguments placed before the engine's `--config`
    pub engine_args: Vec<String>,
    /// Wall-clock limit per engine run
    pub run_timeout_secs: u64,
    /// Schema version journals are checked against
    pub schema_version: String,
    /// Lenient issue cap
    pub max_errors: usize,
    /// Parent directory for promotion artifacts
    pub artifacts_dir: PathBuf,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            engine: None,
            engine_args: Vec::new(),
            run_timeout_secs: 600,
            schema_version: SCHEMA_VERSION.to_owned(),
            max_errors: DEFAULT_MAX_ERRORS,
            artifacts_dir: PathBuf::from("artifacts"),
        }
    }
}

impl ToolSettings {
    /// Load from the default file name and the process environment
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from(SETTINGS_FILE)
    }

    /// Load from `name` (any supported extension, may be absent) and the
    /// process environment
    pub fn load_from(name: &str) -> Result<Self, config::ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()?;
        settings.try_deserialize()
    }

    /// Per-run timeout as a duration
    #[must_use]
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}
