//! Input sources.
//!
//! Every source is an iterator of [`RowResult`]: rows in input order, each
//! with its source line, or an error. Malformed rows come out as skippable
//! [`SourceError::Row`] values; anything else ends the run.
//!
//! - [`CsvSource`] - CSV text with encoding and delimiter auto-detection
//! - [`JsonSource`] - JSON array of rows (flattened spreadsheet ranges)
//! - [`from_rows`] - rows already in memory

mod csv_source;
mod decode;
mod json_source;

use std::path::Path;

use crate::error::SourceError;
use crate::models::Row;

pub use csv_source::{CsvOptions, CsvSource};
pub use decode::DecodingReader;
pub use json_source::JsonSource;

/// A row together with the line it came from (1-based).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub line: u64,
    pub row: Row,
}

/// Item type of every input source.
pub type RowResult = Result<SourceRow, SourceError>;

/// What was detected (or forced) when opening an input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputInfo {
    pub encoding: String,
    pub delimiter: Option<char>,
    pub format: InputFormat,
}

/// Kind of input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// `.json` files are row arrays; everything else is read as CSV.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => InputFormat::Json,
            _ => InputFormat::Csv,
        }
    }
}

/// Detect the encoding of raw bytes using chardet.
///
/// Valid UTF-8 is taken as is, including a sample cut inside its last
/// character.
pub fn detect_encoding(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(_) => return "utf-8".to_string(),
        Err(e) if e.error_len().is_none() => return "utf-8".to_string(),
        Err(_) => {}
    }

    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Map an encoding label to a decoder, falling back to UTF-8.
pub fn encoding_for_label(label: &str) -> &'static encoding_rs::Encoding {
    encoding_rs::Encoding::for_label(label.as_bytes()).unwrap_or(encoding_rs::UTF_8)
}

/// Detect the delimiter by counting occurrences in the first line after
/// `skip_lines` leading lines (report titles and the like).
pub fn detect_delimiter(content: &str, skip_lines: usize) -> char {
    let first_line = content.lines().nth(skip_lines).unwrap_or("");

    let separators = [';', ',', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Printable form of a delimiter.
pub fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "\\t".to_string(),
        c => c.to_string(),
    }
}

/// Wrap in-memory rows as a source. Lines are numbered from 1.
pub fn from_rows<I>(rows: I) -> impl Iterator<Item = RowResult>
where
    I: IntoIterator<Item = Row>,
{
    rows.into_iter().enumerate().map(|(i, row)| {
        Ok(SourceRow {
            line: i as u64 + 1,
            row,
        })
    })
}

/// An opened input of either format.
pub enum InputSource {
    Csv(CsvSource<DecodingReader<std::io::Chain<std::io::Cursor<Vec<u8>>, std::fs::File>>>),
    Json(JsonSource),
}

impl Iterator for InputSource {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            InputSource::Csv(source) => source.next(),
            InputSource::Json(source) => source.next(),
        }
    }
}

/// Open `path` as CSV or JSON depending on its extension.
pub fn open_input(path: &Path, options: &CsvOptions) -> Result<(InputSource, InputInfo), SourceError> {
    match InputFormat::from_path(path) {
        InputFormat::Json => {
            let source = JsonSource::from_path(path)?;
            let info = InputInfo {
                encoding: "utf-8".to_string(),
                delimiter: None,
                format: InputFormat::Json,
            };
            Ok((InputSource::Json(source), info))
        }
        InputFormat::Csv => {
            let (source, info) = CsvSource::open(path, options)?;
            Ok((InputSource::Csv(source), info))
        }
    }
}
