//! High-level API: split a file (or in-memory rows) end to end.
//!
//! Opens the input, prepares the run directory, runs the [`SplitEngine`] and
//! writes `summary.json` / `report.txt`.
//!
//! # Example
//!
//! ```rust,ignore
//! use sheetsplit::{split_file, AutoSkip, SplitConfig, SplitOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SplitConfig::from_file(Path::new("split.json"))?;
//!     let outcome = split_file(
//!         Path::new("sales.csv"),
//!         &config,
//!         SplitOptions::new("output"),
//!         Box::new(AutoSkip),
//!     )
//!     .await?;
//!
//!     println!("{} files in {}", outcome.report.files.len(), outcome.output_dir.display());
//!     Ok(())
//! }
//! ```

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::config::{format_bytes, SplitConfig, SplitSettings};
use crate::engine::{OperatorPrompt, SplitEngine};
use crate::error::{OutputError, RunFailure, SourceError, SplitError};
use crate::models::{Header, Row};
use crate::output::sanitize_file_name;
use crate::parser::{format_delimiter, open_input, InputInfo, RowResult};
use crate::progress::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::report::{write_report_files, RunReport};

/// Where and how a run writes its output.
#[derive(Debug, Clone)]
pub struct SplitOptions {
    pub output_root: PathBuf,
    /// Write into a timestamped sub-directory of `output_root`.
    pub run_dir: bool,
    /// Overrides the configured base name and the input file stem.
    pub base_name: Option<String>,
}

impl SplitOptions {
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            run_dir: true,
            base_name: None,
        }
    }
}

/// Result of a successful run.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    pub report: RunReport,
    pub input: InputInfo,
    pub output_dir: PathBuf,
}

/// Split a CSV or JSON file.
pub async fn split_file(
    input: &Path,
    config: &SplitConfig,
    options: SplitOptions,
    prompt: Box<dyn OperatorPrompt + Send>,
) -> Result<SplitOutcome, RunFailure> {
    let settings = config.compile().map_err(SplitError::from)?;

    log_info(format!("📖 Reading {}", input.display()));
    let (source, info) = open_input(input, &settings.csv).map_err(SplitError::from)?;
    log_success(format!("Encoding: {}", info.encoding));
    if let Some(d) = info.delimiter {
        log_success(format!("Delimiter: '{}'", format_delimiter(d)));
    }

    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output");
    let base = resolve_base_name(&options, config, stem);

    let report = run_split(source, settings, &options, &base, prompt).await?;
    Ok(SplitOutcome {
        output_dir: report.output_dir.clone(),
        report,
        input: info,
    })
}

/// Split rows that are already in memory, e.g. a flattened spreadsheet range.
pub async fn split_rows<I>(
    rows: I,
    config: &SplitConfig,
    options: SplitOptions,
    prompt: Box<dyn OperatorPrompt + Send>,
) -> Result<RunReport, RunFailure>
where
    I: IntoIterator<Item = Row>,
{
    let settings = config.compile().map_err(SplitError::from)?;
    let base = resolve_base_name(&options, config, "rows");
    run_split(crate::parser::from_rows(rows), settings, &options, &base, prompt).await
}

fn resolve_base_name(options: &SplitOptions, config: &SplitConfig, fallback: &str) -> String {
    let raw = options
        .base_name
        .as_deref()
        .or(config.base_name.as_deref())
        .unwrap_or(fallback);
    sanitize_file_name(raw)
}

async fn run_split<I>(
    rows: I,
    settings: SplitSettings,
    options: &SplitOptions,
    base: &str,
    prompt: Box<dyn OperatorPrompt + Send>,
) -> Result<RunReport, RunFailure>
where
    I: IntoIterator<Item = RowResult>,
{
    let output_dir = prepare_output_dir(&options.output_root, base, options.run_dir)
        .await
        .map_err(SplitError::from)?;
    log_info(format!("📂 Output: {}", output_dir.display()));
    describe_settings(&settings);

    log_info("🔄 Splitting...");
    let report = match SplitEngine::new(settings, &output_dir, base)
        .with_prompt(prompt)
        .run(rows)
        .await
    {
        Ok(report) => report,
        Err(failure) => {
            log_error(format!("Stopped after {} rows read", failure.summary.rows_read));
            return Err(failure);
        }
    };

    if let Err(error) = write_report_files(&output_dir, &report).await {
        return Err(RunFailure {
            error,
            summary: report.summary,
        });
    }

    announce(&report);
    Ok(report)
}

/// Create the directory a run writes into.
///
/// With `run_dir` this is `{root}/{base} {YYYY-MM-DD HHMMSS}`; a second run in
/// the same second gets a ` 2`, ` 3`, ... suffix.
pub async fn prepare_output_dir(root: &Path, base: &str, run_dir: bool) -> Result<PathBuf, OutputError> {
    let create_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| OutputError::CreateDir { path, source }
    };

    tokio::fs::create_dir_all(root).await.map_err(create_err(root))?;
    if !run_dir {
        return Ok(root.to_path_buf());
    }

    let stamp = chrono::Local::now().format("%Y-%m-%d %H%M%S");
    let name = format!("{} {}", base, stamp);
    let mut candidate = root.join(&name);
    let mut n = 1;
    loop {
        match tokio::fs::create_dir(&candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                n += 1;
                candidate = root.join(format!("{} {}", name, n));
            }
            Err(e) => return Err(create_err(&candidate)(e)),
        }
    }
}

fn describe_settings(settings: &SplitSettings) {
    match &settings.category_fields {
        Some(fields) if !fields.is_empty() => {
            let names: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
            log_info(format!("Categories: {}", names.join(", ")));
        }
        Some(_) => log_info("Categories: none"),
        None => {}
    }
    if let Some(max) = settings.max_file_size {
        log_info(format!("Max file size: {}", format_bytes(max)));
    }
    if !settings.filter.is_empty() {
        log_info(format!(
            "Filter: {}",
            settings.filter.snapshot(settings.match_policy)
        ));
    }
    if let Some(limit) = settings.row_count_limit {
        log_info(format!("Row limit: {}", limit));
    }
}

fn announce(report: &RunReport) {
    let s = &report.summary;
    log_success(format!(
        "{} rows written to {} files ({})",
        s.rows_written,
        s.file_count,
        format_bytes(s.bytes_written)
    ));
    for file in &report.files {
        log_info_indent(
            format!("{} ({} rows)", file.file_name, file.rows_written),
            1,
        );
    }
    if s.rows_malformed > 0 {
        log_warning(format!("{} malformed rows skipped", s.rows_malformed));
    }
    if s.rows_filtered > 0 {
        log_info(format!("{} rows filtered out", s.rows_filtered));
    }
    if s.limit_reached {
        log_warning(format!("Stopped at the row limit ({} rows read)", s.rows_read));
    }
}

// =============================================================================
// Inspect
// =============================================================================

/// What `sheetsplit inspect` shows about an input.
#[derive(Debug, Clone, Serialize)]
pub struct Inspection {
    pub encoding: String,
    pub delimiter: Option<char>,
    pub header: Vec<String>,
    pub preview: Vec<Vec<String>>,
    /// Malformed rows among those read for the preview.
    pub malformed: usize,
}

/// Read the header and the first `preview_rows` rows of an input.
pub fn inspect_file(input: &Path, config: &SplitConfig, preview_rows: usize) -> Result<Inspection, SplitError> {
    let settings = config.compile()?;
    let (source, info) = open_input(input, &settings.csv)?;
    let mut rows = source.skip(settings.skip_leading_rows as usize);

    let first = rows.next().ok_or(SplitError::EmptyInput)??;
    let (header, first_data) = match first.row {
        Row::Keyed(pairs) => {
            let header = Header::from_names(pairs.iter().map(|(k, _)| k.clone()));
            (header, Some(Row::Keyed(pairs)))
        }
        Row::Positional(values) if settings.has_header => (Header::from_values(&values), None),
        Row::Positional(values) => (Header::synthesized(values.len()), Some(Row::Positional(values))),
    };
    let header = std::sync::Arc::new(header);

    let mut preview = Vec::new();
    let mut malformed = 0;
    let pending = first_data.map(|row| Ok(crate::parser::SourceRow { line: first.line, row }));
    for item in pending.into_iter().chain(rows).take(preview_rows) {
        match item {
            Ok(source_row) => match source_row.row.resolve(&header, source_row.line) {
                Ok(named) => preview.push(named.values().iter().map(|v| v.to_string()).collect()),
                Err(_) => malformed += 1,
            },
            Err(SourceError::Row(_)) => malformed += 1,
            Err(fatal) => return Err(fatal.into()),
        }
    }

    Ok(Inspection {
        encoding: info.encoding,
        delimiter: info.delimiter,
        header: header.names().to_vec(),
        preview,
        malformed,
    })
}
