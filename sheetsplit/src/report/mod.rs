//! End-of-run summary and report files.
//!
//! A finished run leaves two files next to its output:
//!
//! - `summary.json` - the [`RunReport`], machine readable
//! - `report.txt` - the same information as a table

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::format_bytes;
use crate::error::{SplitError, SplitResult};
use crate::filter::FilterSnapshot;
use crate::output::{FileMetrics, HeaderPlacement};

pub const SUMMARY_FILE: &str = "summary.json";
pub const REPORT_FILE: &str = "report.txt";

/// Totals of a run, complete or partial.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    pub rows_read: u64,
    pub rows_written: u64,
    /// Malformed plus filtered.
    pub rows_skipped: u64,
    pub rows_malformed: u64,
    pub rows_filtered: u64,
    pub bytes_written: u64,
    pub file_count: usize,
    pub category_count: usize,
    /// The run stopped at the row limit rather than the end of input.
    pub limit_reached: bool,
}

impl RunSummary {
    /// Totals for the given files plus the engine's row counters.
    pub fn from_files(counters: RowCounters, files: &[FileMetrics], category_count: usize) -> Self {
        Self {
            rows_read: counters.read,
            rows_written: files.iter().map(|f| f.rows_written).sum(),
            rows_skipped: counters.malformed + counters.filtered,
            rows_malformed: counters.malformed,
            rows_filtered: counters.filtered,
            bytes_written: files.iter().map(|f| f.bytes_written).sum(),
            file_count: files.len(),
            category_count,
            limit_reached: counters.limit_reached,
        }
    }
}

/// Row counters kept by the engine while streaming.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RowCounters {
    pub read: u64,
    pub malformed: u64,
    pub filtered: u64,
    pub limit_reached: bool,
}

/// Everything known about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub base_name: String,
    pub output_dir: PathBuf,
    pub generated_at: String,
    pub header_placement: HeaderPlacement,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header_file: Option<String>,
    pub header: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSnapshot>,
    pub summary: RunSummary,
    pub files: Vec<FileMetrics>,
}

impl RunReport {
    pub fn summary(&self) -> &RunSummary {
        &self.summary
    }
}

/// Render the report as a plain-text table.
pub fn render_table(report: &RunReport) -> String {
    let headings = ["File", "Category", "Rows", "Size"];
    let rows: Vec<[String; 4]> = report
        .files
        .iter()
        .map(|f| {
            [
                f.file_name.clone(),
                f.category.clone(),
                f.rows_written.to_string(),
                format_bytes(f.bytes_written),
            ]
        })
        .collect();

    let mut widths = headings.map(|h| h.chars().count());
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 4]| -> String {
        let mut out = String::new();
        for (i, (cell, width)) in cells.iter().zip(widths.iter()).enumerate() {
            let pad = width - cell.chars().count();
            // Numbers right-aligned.
            if i >= 2 {
                out.push_str(&" ".repeat(pad));
                out.push_str(cell);
            } else {
                out.push_str(cell);
                out.push_str(&" ".repeat(pad));
            }
            if i < cells.len() - 1 {
                out.push_str("  ");
            }
        }
        out.trim_end().to_string()
    };

    let s = &report.summary;
    let mut out = String::new();
    out.push_str(&format!("Split report: {}\n", report.base_name));
    out.push_str(&format!("Generated:    {}\n", report.generated_at));
    out.push_str(&format!("Output:       {}\n", report.output_dir.display()));
    out.push_str(&format!("Header:       {}", report.header_placement));
    if let Some(file) = &report.header_file {
        out.push_str(&format!(" ({})", file));
    }
    out.push('\n');
    if let Some(filter) = &report.filter {
        out.push_str(&format!("Filter:       {}\n", filter));
    }
    out.push('\n');

    out.push_str(&line(headings));
    out.push('\n');
    let total: usize = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    out.push_str(&"-".repeat(total));
    out.push('\n');
    for row in &rows {
        out.push_str(&line([row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str()]));
        out.push('\n');
    }
    out.push('\n');

    out.push_str(&format!("Rows read:      {}\n", s.rows_read));
    out.push_str(&format!("Rows written:   {}\n", s.rows_written));
    out.push_str(&format!(
        "Rows skipped:   {} ({} malformed, {} filtered)\n",
        s.rows_skipped, s.rows_malformed, s.rows_filtered
    ));
    out.push_str(&format!("Bytes written:  {}\n", format_bytes(s.bytes_written)));
    out.push_str(&format!(
        "Files:          {} in {} categories\n",
        s.file_count, s.category_count
    ));
    if s.limit_reached {
        out.push_str("Stopped at the row limit.\n");
    }
    out
}

/// Write `summary.json` and `report.txt` into `dir`.
pub async fn write_report_files(dir: &Path, report: &RunReport) -> SplitResult<()> {
    let summary_path = dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(report).map_err(|e| SplitError::Report {
        path: summary_path.clone(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    })?;
    write(&summary_path, json.as_bytes()).await?;
    write(&dir.join(REPORT_FILE), render_table(report).as_bytes()).await
}

async fn write(path: &Path, content: &[u8]) -> SplitResult<()> {
    tokio::fs::write(path, content)
        .await
        .map_err(|source| SplitError::Report {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metrics(name: &str, category: &str, rows: u64, bytes: u64) -> FileMetrics {
        FileMetrics {
            category: category.to_string(),
            rotation: None,
            file_name: name.to_string(),
            path: PathBuf::from(name),
            bytes_written: bytes,
            rows_written: rows,
            filter: None,
        }
    }

    fn report() -> RunReport {
        let files = vec![
            metrics("sales USA.csv", "USA", 6, 120),
            metrics("sales CAN.csv", "CAN", 3, 2048),
        ];
        let counters = RowCounters {
            read: 12,
            malformed: 1,
            filtered: 2,
            limit_reached: false,
        };
        RunReport {
            base_name: "sales".into(),
            output_dir: PathBuf::from("out"),
            generated_at: "2024-05-01T10:00:00+00:00".into(),
            header_placement: HeaderPlacement::PerFile,
            header_file: None,
            header: vec!["country".into(), "qty".into()],
            filter: None,
            summary: RunSummary::from_files(counters, &files, 2),
            files,
        }
    }

    #[test]
    fn test_summary_totals() {
        let s = report().summary;
        assert_eq!(s.rows_written, 9);
        assert_eq!(s.rows_skipped, 3);
        assert_eq!(s.rows_written, s.rows_read - s.rows_skipped);
        assert_eq!(s.bytes_written, 2168);
        assert_eq!(s.file_count, 2);
    }

    #[test]
    fn test_render_table() {
        let table = render_table(&report());
        assert!(table.contains("sales USA.csv  USA"));
        assert!(table.contains("2.0 KB"));
        assert!(table.contains("Rows skipped:   3 (1 malformed, 2 filtered)"));
        assert!(table.contains("Files:          2 in 2 categories"));
        assert!(!table.contains("row limit"));
    }

    #[tokio::test]
    async fn test_write_report_files() {
        let dir = TempDir::new().unwrap();
        write_report_files(dir.path(), &report()).await.unwrap();

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join(SUMMARY_FILE)).unwrap())
                .unwrap();
        assert_eq!(json["summary"]["rows_read"], 12);
        assert_eq!(json["header_placement"], "per_file");
        assert_eq!(json["files"][1]["file_name"], "sales CAN.csv");
        assert!(dir.path().join(REPORT_FILE).exists());
    }

    #[tokio::test]
    async fn test_report_into_missing_dir_fails() {
        let dir = TempDir::new().unwrap();
        let err = write_report_files(&dir.path().join("gone"), &report())
            .await
            .unwrap_err();
        assert!(matches!(err, SplitError::Report { .. }));
    }
}
