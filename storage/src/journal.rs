//! Event journal: single-writer append and whole-file loading

use crate::canonical::{canonical_json, canonicalize_json_text};
use crate::error::{CodecError, Result};
use crate::meta::JournalMeta;
use crate::rows::{self, RawRow};
use chrono::{DateTime, Utc};
use common::{EventType, format_utc};
use serde_json::Value;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column names written on line 2 of every events file
pub const EVENTS_HEADER: [&str; 5] = [
    "sequence",
    "utc_ts",
    "event_type",
    "src_adapter",
    "payload_json",
];

/// Append-only writer for one journal file.
///
/// Sequence numbers start at 1 and grow by exactly one per event. Appends
/// take `&mut self`; threads that produce events must funnel them through
/// the single owner of the writer.
pub struct JournalWriter {
    path: PathBuf,
    out: csv::Writer<File>,
    src_adapter: String,
    next_sequence: u64,
    last_ts: Option<DateTime<Utc>>,
}

impl JournalWriter {
    /// Create (or truncate) a journal and write its meta and header lines
    pub fn create(path: &Path, meta: &JournalMeta, src_adapter: impl Into<String>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(CodecError::io(parent))?;
        }
        let mut file = File::create(path).map_err(CodecError::io(path))?;
        writeln!(file, "{meta}").map_err(CodecError::io(path))?;
        let mut out = rows::writer(file);
        out.write_record(EVENTS_HEADER)?;

        info!("Opened journal {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            out,
            src_adapter: src_adapter.into(),
            next_sequence: 1,
            last_ts: None,
        })
    }

    /// Append one event and return the sequence number it was given
    pub fn append(
        &mut self,
        utc_ts: DateTime<Utc>,
        event_type: EventType,
        payload: &Value,
    ) -> Result<u64> {
        if let Some(last) = self.last_ts.filter(|last| utc_ts < *last) {
            return Err(CodecError::TimestampRegression {
                last: format_utc(&last),
                next: format_utc(&utc_ts),
            });
        }

        let sequence = self.next_sequence;
        self.out.write_record([
            sequence.to_string(),
            format_utc(&utc_ts),
            event_type.as_str().to_owned(),
            self.src_adapter.clone(),
            canonical_json(payload),
        ])?;

        self.next_sequence += 1;
        self.last_ts = Some(utc_ts);
        debug!("Appended {} seq={}", event_type, sequence);
        Ok(sequence)
    }

    /// Flush buffered rows to disk
    pub fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(CodecError::io(&self.path))
    }

    /// Sequence the next append will receive
    #[must_use]
    pub const fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}

/// Positions of the named columns in an events header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventColumns {
    /// `sequence`
    pub sequence: usize,
    /// `utc_ts`
    pub utc_ts: usize,
    /// `event_type`
    pub event_type: usize,
    /// `payload_json`
    pub payload_json: usize,
    /// `src_adapter`; absent in the legacy four-column layout
    pub src_adapter: Option<usize>,
    /// Number of columns every row must have
    pub width: usize,
}

impl EventColumns {
    /// Resolve columns by name
    pub fn resolve(header: &[String]) -> Result<Self> {
        let find = |name: &str| header.iter().position(|h| h == name);
        let require =
            |name: &str| find(name).ok_or_else(|| CodecError::MissingColumn(name.to_owned()));
        Ok(Self {
            sequence: require("sequence")?,
            utc_ts: require("utc_ts")?,
            event_type: require("event_type")?,
            payload_json: require("payload_json")?,
            src_adapter: find("src_adapter"),
            width: header.len(),
        })
    }
}

/// A journal row split into its columns; the payload stays unparsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    /// 1-based line number in the file
    pub line_no: usize,
    /// Sequence column
    pub sequence: u64,
    /// Raw timestamp text
    pub utc_ts: String,
    /// Raw event type tag
    pub event_type: String,
    /// Source adapter, when the layout has the column
    pub src_adapter: Option<String>,
    /// Unescaped payload JSON text
    pub payload: String,
}

impl RecordedEvent {
    /// Parse the payload
    pub fn payload_value(&self) -> std::result::Result<Value, serde_json::Error> {
        serde_json::from_str(&self.payload)
    }

    /// `utc_ts|event_type|canonical payload`; raw payload when it is not JSON
    #[must_use]
    pub fn comparison_line(&self) -> String {
        let payload =
            canonicalize_json_text(&self.payload).unwrap_or_else(|_| self.payload.clone());
        format!("{}|{}|{}", self.utc_ts, self.event_type, payload)
    }
}

/// A fully materialized events file
#[derive(Debug, Clone)]
pub struct JournalFile {
    /// Source path
    pub path: PathBuf,
    /// Line 1 verbatim
    pub meta_line: String,
    /// Parsed line 1
    pub meta: JournalMeta,
    /// Line number of the header
    pub header_line_no: usize,
    /// Header column names
    pub header: Vec<String>,
    /// Data rows
    pub rows: Vec<RawRow>,
}

impl JournalFile {
    /// Read a journal. Missing file or envelope lines are errors; rows are
    /// not validated here.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(CodecError::io(path))?;
        let missing = || CodecError::MissingEnvelope(path.to_path_buf());

        let (meta_line_no, meta_line, body) =
            rows::split_first_line(rows::strip_bom(&text)).ok_or_else(missing)?;
        let mut records = rows::read_rows(body, meta_line_no + 1)?.into_iter();
        let header_row = records.next().ok_or_else(missing)?;
        let header = header_row.fields.iter().map(|h| h.trim().to_owned()).collect();
        let rows = records.collect();

        Ok(Self {
            path: path.to_path_buf(),
            meta_line: meta_line.to_owned(),
            meta: JournalMeta::parse(meta_line),
            header_line_no: header_row.line_no,
            header,
            rows,
        })
    }

    /// Resolve header columns
    pub fn columns(&self) -> Result<EventColumns> {
        EventColumns::resolve(&self.header)
    }

    /// Split every row into a [`RecordedEvent`]. Any malformed row is an error.
    pub fn events(&self) -> Result<Vec<RecordedEvent>> {
        let cols = self.columns()?;
        self.rows
            .iter()
            .map(|row| {
                let malformed = |reason: String| CodecError::MalformedRow {
                    line: row.line_no,
                    reason,
                };
                let fields = &row.fields;
                if fields.len() != cols.width {
                    return Err(malformed(format!(
                        "expected {} columns, found {}",
                        cols.width,
                        fields.len()
                    )));
                }
                let sequence = fields[cols.sequence]
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| malformed(format!("invalid sequence '{}'", fields[cols.sequence])))?;
                Ok(RecordedEvent {
                    line_no: row.line_no,
                    sequence,
                    utc_ts: fields[cols.utc_ts].clone(),
                    event_type: fields[cols.event_type].clone(),
                    src_adapter: cols.src_adapter.map(|i| fields[i].clone()),
                    payload: fields[cols.payload_json].clone(),
                })
            })
            .collect()
    }
}
