//! Codec error types

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing journal files
#[derive(Error, Debug)]
pub enum CodecError {
    /// Underlying file system failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// File lacks the meta line or the header line
    #[error("missing meta/header lines in {}", .0.display())]
    MissingEnvelope(PathBuf),

    /// Header does not name a required column
    #[error("required column missing in header: {0}")]
    MissingColumn(String),

    /// A row could not be split or has the wrong shape
    #[error("malformed row at line {line}: {reason}")]
    MalformedRow {
        /// 1-based line number in the file
        line: usize,
        /// What went wrong
        reason: String,
    },

    /// CSV record could not be written
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Payload or document is not valid JSON
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Appended event would move time backwards
    #[error("timestamp regression: {next} precedes {last}")]
    TimestampRegression {
        /// Latest timestamp already written
        last: String,
        /// Rejected timestamp
        next: String,
    },
}

impl CodecError {
    /// Adapter for `map_err` on I/O results
    pub fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
