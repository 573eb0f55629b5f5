//! Journal meta line: comma-separated `key=value` pairs

use std::fmt;

/// Schema version key
pub const SCHEMA_VERSION_KEY: &str = "schema_version";
/// Configuration hash key
pub const CONFIG_HASH_KEY: &str = "config_hash";
/// Input data version key
pub const DATA_VERSION_KEY: &str = "data_version";

/// Ordered `key=value` pairs from line 1 of a journal
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalMeta {
    entries: Vec<(String, String)>,
}

impl JournalMeta {
    /// Minimal meta with schema version and config hash
    pub fn new(schema_version: impl Into<String>, config_hash: impl Into<String>) -> Self {
        Self {
            entries: vec![
                (SCHEMA_VERSION_KEY.to_owned(), schema_version.into()),
                (CONFIG_HASH_KEY.to_owned(), config_hash.into()),
            ],
        }
    }

    /// Append or replace a pair
    #[must_use]
    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_owned(), value)),
        }
        self
    }

    /// Parse a meta line. Fragments without exactly one `=` are ignored.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let entries = line
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .filter_map(|part| {
                let mut kv = part.split('=');
                match (kv.next(), kv.next(), kv.next()) {
                    (Some(k), Some(v), None) => Some((k.to_owned(), v.to_owned())),
                    _ => None,
                }
            })
            .collect();
        Self { entries }
    }

    /// Value of the first pair named `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `schema_version`, when present and non-blank
    #[must_use]
    pub fn schema_version(&self) -> Option<&str> {
        self.get(SCHEMA_VERSION_KEY).filter(|v| !v.trim().is_empty())
    }

    /// `config_hash`, when present and non-blank
    #[must_use]
    pub fn config_hash(&self) -> Option<&str> {
        self.get(CONFIG_HASH_KEY).filter(|v| !v.trim().is_empty())
    }

    /// `data_version`, when present
    #[must_use]
    pub fn data_version(&self) -> Option<&str> {
        self.get(DATA_VERSION_KEY)
    }

    /// All pairs in file order
    #[must_use]
    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

impl fmt::Display for JournalMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
        }
        Ok(())
    }
}
