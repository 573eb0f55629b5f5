//! Promotion error types

use journal_verify::VerifyError;
use risk_manager::ConfigError;
use std::path::PathBuf;
use storage::CodecError;
use thiserror::Error;

/// Failures that stop the gate before it can reach a decision
#[derive(Error, Debug)]
pub enum PromotionError {
    /// A configuration document could not be loaded
    #[error("config {}: {source}", path.display())]
    Config {
        /// Config path
        path: PathBuf,
        /// Cause
        #[source]
        source: ConfigError,
    },

    /// The engine process could not be started
    #[error("failed to spawn engine {}: {source}", engine.display())]
    Spawn {
        /// Engine executable
        engine: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// Scratch or artifact file handling failed
    #[error("artifact I/O on {}: {source}", path.display())]
    Artifact {
        /// File or directory involved
        path: PathBuf,
        /// Cause
        #[source]
        source: std::io::Error,
    },

    /// A run's journal could not be decoded
    #[error("journal codec error: {0}")]
    Codec(#[from] CodecError),

    /// A verification pass could not run
    #[error("verification error: {0}")]
    Verify(#[from] VerifyError),

    /// Result serialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PromotionError {
    /// Build a [`PromotionError::Artifact`] mapper for `path`
    pub fn artifact(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Artifact { path, source }
    }
}

/// Result alias for promotion
pub type Result<T> = std::result::Result<T, PromotionError>;
