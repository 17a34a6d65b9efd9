//! CSV row source built on the `csv` crate.

use csv::{ReaderBuilder, StringRecord};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use super::decode::DecodingReader;
use super::{
    detect_delimiter, detect_encoding, encoding_for_label, InputFormat, InputInfo, RowResult,
    SourceRow,
};
use crate::error::{RowError, SourceError};
use crate::models::{Row, Scalar};

/// Bytes sampled from the start of the file for encoding/delimiter detection.
const SAMPLE_SIZE: u64 = 64 * 1024;

/// CSV dialect. `None` delimiter means auto-detect.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvOptions {
    pub delimiter: Option<u8>,
    pub quote: u8,
    /// Escape character; `None` means quotes are escaped by doubling.
    pub escape: Option<u8>,
    /// Leading lines ignored when sniffing the delimiter.
    pub skip_lines: u64,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: None,
            quote: b'"',
            escape: None,
            skip_lines: 0,
        }
    }
}

/// Reads CSV records as positional rows. Does not interpret a header.
pub struct CsvSource<R: Read> {
    reader: csv::Reader<R>,
    path: PathBuf,
    done: bool,
}

impl CsvSource<DecodingReader<std::io::Chain<Cursor<Vec<u8>>, File>>> {
    /// Open a CSV file, sniffing encoding and (unless given) delimiter from
    /// its first bytes.
    pub fn open(path: &Path, options: &CsvOptions) -> Result<(Self, InputInfo), SourceError> {
        let io_err = |source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let mut sample = Vec::new();
        (&mut file)
            .take(SAMPLE_SIZE)
            .read_to_end(&mut sample)
            .map_err(io_err)?;

        let encoding_name = detect_encoding(&sample);
        let encoding = encoding_for_label(&encoding_name);
        let delimiter = match options.delimiter {
            Some(d) => d as char,
            None => detect_delimiter(&encoding.decode(&sample).0, options.skip_lines as usize),
        };

        let options = CsvOptions {
            delimiter: Some(delimiter as u8),
            ..options.clone()
        };
        let reader = DecodingReader::new(Cursor::new(sample).chain(file), encoding);
        let source = CsvSource::from_reader(reader, &options, path);

        let info = InputInfo {
            encoding: encoding.name().to_lowercase(),
            delimiter: Some(delimiter),
            format: InputFormat::Csv,
        };
        Ok((source, info))
    }
}

impl<R: Read> CsvSource<R> {
    /// Read UTF-8 CSV from any reader. An unset delimiter means `,`.
    pub fn from_reader(reader: R, options: &CsvOptions, path: &Path) -> Self {
        let reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(options.delimiter.unwrap_or(b','))
            .quote(options.quote)
            .escape(options.escape)
            .double_quote(options.escape.is_none())
            .from_reader(reader);

        Self {
            reader,
            path: path.to_path_buf(),
            done: false,
        }
    }
}

impl<R: Read> Iterator for CsvSource<R> {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(false) => {
                self.done = true;
                None
            }
            Ok(true) => {
                let line = record.position().map(|p| p.line()).unwrap_or(0);
                let values = record.iter().map(Scalar::from).collect();
                Some(Ok(SourceRow {
                    line,
                    row: Row::Positional(values),
                }))
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                match e.into_kind() {
                    csv::ErrorKind::Io(source) => {
                        self.done = true;
                        Some(Err(SourceError::Io {
                            path: self.path.clone(),
                            source,
                        }))
                    }
                    csv::ErrorKind::Utf8 { err, .. } => Some(Err(SourceError::Row(RowError::Parse {
                        line,
                        message: err.to_string(),
                    }))),
                    kind => {
                        self.done = true;
                        Some(Err(SourceError::Csv {
                            line,
                            message: format!("{:?}", kind),
                        }))
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn rows(csv: &str, options: &CsvOptions) -> Vec<Vec<String>> {
        CsvSource::from_reader(csv.as_bytes(), options, Path::new("mem.csv"))
            .map(|r| match r.unwrap().row {
                Row::Positional(v) => v.iter().map(|s| s.to_string()).collect(),
                Row::Keyed(_) => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_quoted_values_with_delimiters_and_newlines() {
        let csv = "name,desc\n\"Smith, J\",\"Line1\nLine2\"\n";
        let parsed = rows(csv, &CsvOptions::default());
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1], vec!["Smith, J", "Line1\nLine2"]);
    }

    #[test]
    fn test_ragged_rows_are_returned_as_is() {
        let options = CsvOptions {
            delimiter: Some(b';'),
            ..CsvOptions::default()
        };
        let parsed = rows("a;b;c\n1;2\n", &options);
        assert_eq!(parsed[1], vec!["1", "2"]);
    }

    #[test]
    fn test_escape_character() {
        let options = CsvOptions {
            escape: Some(b'\\'),
            ..CsvOptions::default()
        };
        let parsed = rows("a\n\"say \\\"hi\\\"\"\n", &options);
        assert_eq!(parsed[1], vec!["say \"hi\""]);
    }

    #[test]
    fn test_line_numbers() {
        let source =
            CsvSource::from_reader("a\n1\n2\n".as_bytes(), &CsvOptions::default(), Path::new("m"));
        let lines: Vec<u64> = source.map(|r| r.unwrap().line).collect();
        assert_eq!(lines, vec![1, 2, 3]);
    }

    #[test]
    fn test_open_strips_bom_and_detects_semicolon() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bom.csv");
        let mut content = String::from("\u{FEFF}nom;ville\n");
        for _ in 0..50 {
            content.push_str("Société;Orléans\n");
        }
        fs::write(&path, content).unwrap();

        let (source, info) = CsvSource::open(&path, &CsvOptions::default()).unwrap();
        assert_eq!(info.delimiter, Some(';'));
        let all: Vec<SourceRow> = source.map(|r| r.unwrap()).collect();
        assert_eq!(all.len(), 51);
        assert_eq!(
            all[0].row,
            Row::Positional(vec![Scalar::from("nom"), Scalar::from("ville")])
        );
        assert_eq!(
            all[1].row,
            Row::Positional(vec![Scalar::from("Société"), Scalar::from("Orléans")])
        );
    }

    #[test]
    fn test_open_utf8_split_at_sample_boundary() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("boundary.csv");
        let mut content = String::from("a\n");
        while content.len() < SAMPLE_SIZE as usize - 1 {
            content.push('x');
        }
        // "é" straddles the end of the sample
        content.push_str("é\nSociété\n");
        fs::write(&path, content).unwrap();

        let (source, info) = CsvSource::open(&path, &CsvOptions::default()).unwrap();
        assert_eq!(info.encoding, "utf-8");
        let all: Vec<SourceRow> = source.map(|r| r.unwrap()).collect();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].row, Row::Positional(vec![Scalar::from("Société")]));
    }

    #[test]
    fn test_open_sniffs_delimiter_after_skipped_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("titled.csv");
        fs::write(&path, "Sales report 2024\ncountry;qty\nUSA;1\nCAN;2\n").unwrap();

        let options = CsvOptions {
            skip_lines: 1,
            ..CsvOptions::default()
        };
        let (source, info) = CsvSource::open(&path, &options).unwrap();
        assert_eq!(info.delimiter, Some(';'));
        let all: Vec<SourceRow> = source.map(|r| r.unwrap()).collect();
        assert_eq!(
            all[1].row,
            Row::Positional(vec![Scalar::from("country"), Scalar::from("qty")])
        );
    }

    #[test]
    fn test_forced_delimiter_wins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("forced.csv");
        fs::write(&path, "a;b|c\n1;2|3\n").unwrap();

        let options = CsvOptions {
            delimiter: Some(b'|'),
            ..CsvOptions::default()
        };
        let (source, info) = CsvSource::open(&path, &options).unwrap();
        assert_eq!(info.delimiter, Some('|'));
        assert_eq!(source.count(), 2);
    }

    #[test]
    fn test_open_missing_file() {
        let err = CsvSource::open(Path::new("/definitely/not/here.csv"), &CsvOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::Io { .. }));
    }
}
