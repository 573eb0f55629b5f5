//! Verification error types

use std::path::PathBuf;
use storage::CodecError;
use thiserror::Error;

/// Exit code for a clean run
pub const EXIT_OK: i32 = 0;
/// Exit code for fatal structural or runtime failures
pub const EXIT_FATAL: i32 = 1;
/// Exit code for accumulated violations in strict, deep, diff and parity runs
pub const EXIT_VIOLATIONS: i32 = 2;

/// Verification outcome other than a clean pass
#[derive(Error, Debug)]
pub enum VerifyError {
    /// Input could not be read
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being read
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// The file cannot be interpreted at all; no partial results
    #[error("{0}")]
    Structural(String),

    /// The file was read but checks failed
    #[error("{count} violation(s) found")]
    Violations {
        /// Number of reported issues
        count: usize,
        /// Process exit code for this tool
        exit_code: i32,
    },
}

impl VerifyError {
    /// Process exit code
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Io { .. } | Self::Structural(_) => EXIT_FATAL,
            Self::Violations { exit_code, .. } => *exit_code,
        }
    }

    /// Whether this is a fatal (exit 1) error
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !matches!(self, Self::Violations { .. })
    }
}

impl From<CodecError> for VerifyError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io { path, source } => Self::Io { path, source },
            other => Self::Structural(other.to_string()),
        }
    }
}

/// Result alias for verification
pub type Result<T> = std::result::Result<T, VerifyError>;
