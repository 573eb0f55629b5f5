//! Data version: a content hash over the input files of a run

use crate::error::{CodecError, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::debug;

/// Row count of one hashed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRows {
    /// File as given
    pub path: String,
    /// Lines hashed
    pub rows: usize,
}

/// Hash result over a list of files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataVersion {
    /// Uppercase hex SHA-256
    pub hash: String,
    /// Per-file line counts in hashing order
    pub files: Vec<FileRows>,
}

/// Hash every line of every file in order. Each line has trailing
/// whitespace removed and is followed by a single `\n`.
pub fn compute<P: AsRef<Path>>(paths: &[P]) -> Result<DataVersion> {
    let mut hasher = Sha256::new();
    let mut files = Vec::with_capacity(paths.len());

    for path in paths {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(CodecError::io(path))?;
        let text = crate::rows::strip_bom(&text);
        let mut rows = 0;
        for line in text.lines() {
            hasher.update(line.trim_end().as_bytes());
            hasher.update(b"\n");
            rows += 1;
        }
        debug!("Hashed {} rows from {}", rows, path.display());
        files.push(FileRows {
            path: path.display().to_string(),
            rows,
        });
    }

    Ok(DataVersion {
        hash: hex::encode_upper(hasher.finalize()),
        files,
    })
}
