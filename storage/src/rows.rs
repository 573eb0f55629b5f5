//! CSV rows for journal and trades files
//!
//! Fields are quoted only when needed (comma, double quote, CR or LF), so a
//! quoted field may span several physical lines. The meta line of a journal
//! is not CSV and never goes through here.

use crate::error::{CodecError, Result};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use std::io::Write;

/// One data record with the 1-based file line it starts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based line number of the record's first line
    pub line_no: usize,
    /// Unescaped fields
    pub fields: Vec<String>,
}

/// CSV writer over `out` with LF terminators and minimal quoting
pub fn writer<W: Write>(out: W) -> csv::Writer<W> {
    WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out)
}

/// Escape and join fields into one record (no trailing terminator)
pub fn join_row<I, S>(fields: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<[u8]>,
{
    let mut out = writer(Vec::new());
    out.write_record(fields)?;
    let mut bytes = out
        .into_inner()
        .map_err(|e| CodecError::Csv(e.into_error().into()))?;
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Parse `body` into records. `first_line` is the file line `body` starts on.
///
/// Blank lines are skipped. Records may have differing widths; callers
/// check the shape against their header.
pub fn read_rows(body: &str, first_line: usize) -> Result<Vec<RawRow>> {
    let file_line =
        |line: u64| first_line.saturating_add(usize::try_from(line).unwrap_or(usize::MAX).saturating_sub(1));
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(body.as_bytes());

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| CodecError::MalformedRow {
            line: e.position().map_or(first_line, |p| file_line(p.line())),
            reason: e.to_string(),
        })?;
        if record.len() == 1 && record[0].trim().is_empty() {
            continue;
        }
        rows.push(RawRow {
            line_no: record.position().map_or(first_line, |p| file_line(p.line())),
            fields: record.iter().map(str::to_owned).collect(),
        });
    }
    Ok(rows)
}

/// Split off the first non-blank line.
///
/// Returns its 1-based line number, its text without terminator and the
/// rest of `text` after it.
#[must_use]
pub fn split_first_line(text: &str) -> Option<(usize, &str, &str)> {
    let mut offset = 0;
    for (i, line) in text.split_inclusive('\n').enumerate() {
        offset += line.len();
        let content = line.trim_end_matches(['\r', '\n']);
        if !content.trim().is_empty() {
            return Some((i + 1, content, text.get(offset..).unwrap_or_default()));
        }
    }
    None
}

/// Drop a leading byte-order mark
#[must_use]
pub fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Non-blank physical lines of a text file, numbered from 1, BOM stripped
pub fn numbered_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    strip_bom(text)
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
}
