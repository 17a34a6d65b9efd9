//! Error types for the split pipeline.
//!
//! Errors fall into three families:
//!
//! - [`RowError`] - malformed rows, counted and dropped while the run continues
//! - [`ConfigError`] - invalid configuration, raised before any output exists
//! - [`OutputError`] / [`SourceError`] - fatal I/O failures
//!
//! [`SplitError`] wraps all of them so `?` works across module boundaries, and
//! [`RunFailure`] pairs a fatal error with the counts reached before it.

use std::path::PathBuf;

use thiserror::Error;

use crate::report::RunSummary;

// =============================================================================
// Row Errors (skippable)
// =============================================================================

/// A single input row that cannot be processed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    /// Row width differs from the header width.
    #[error("Line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// Keyed row carries a column the header lacks.
    #[error("Line {line}: column '{column}' is not in the header")]
    UnknownColumn { line: u64, column: String },

    /// Row could not be parsed.
    #[error("Line {line}: {message}")]
    Parse { line: u64, message: String },
}

impl RowError {
    /// Source line (1-based) of the offending row.
    pub fn line(&self) -> u64 {
        match self {
            RowError::ColumnCount { line, .. }
            | RowError::UnknownColumn { line, .. }
            | RowError::Parse { line, .. } => *line,
        }
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Invalid configuration, detected before processing starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A filter regex does not compile.
    #[error("Invalid regex '{pattern}' for column '{column}': {source}")]
    InvalidRegex {
        column: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A column reference is empty or malformed.
    #[error("Invalid column reference: '{0}'")]
    InvalidColumn(String),

    /// A byte size is malformed or zero.
    #[error("Invalid size '{0}' (expected e.g. 512, 64KB, 10MB, 1GB)")]
    InvalidSize(String),

    /// A delimiter, quote or escape character is not a single ASCII byte.
    #[error("Invalid {role} character '{value}': must be a single ASCII character")]
    InvalidChar { role: &'static str, value: char },

    /// A `COL=VALUE` argument is missing its `=`.
    #[error("Invalid filter '{0}' (expected COLUMN=VALUE)")]
    InvalidFilter(String),

    /// Configuration file could not be read.
    #[error("Cannot read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Configuration file is not valid JSON for [`crate::config::SplitConfig`].
    #[error("Invalid config file: {0}")]
    Json(#[from] serde_json::Error),
}

// =============================================================================
// Source Errors
// =============================================================================

/// Errors raised while pulling rows from an input source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Input file could not be opened or read.
    #[error("Cannot read input '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input file is not a usable JSON row array.
    #[error("Invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    /// The CSV reader failed below the record level.
    #[error("CSV read error at line {line}: {message}")]
    Csv { line: u64, message: String },

    /// A single malformed row; the run continues.
    #[error(transparent)]
    Row(#[from] RowError),
}

impl SourceError {
    /// Whether the run may continue past this error.
    pub fn is_skippable(&self) -> bool {
        matches!(self, SourceError::Row(_))
    }
}

// =============================================================================
// Output Errors
// =============================================================================

/// Fatal failures on the output side. Partial output is left on disk.
#[derive(Debug, Error)]
pub enum OutputError {
    /// Output directory could not be created.
    #[error("Cannot create output directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output file could not be opened.
    #[error("Cannot open output file '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Write to an open output file failed.
    #[error("Cannot write to '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Flushing or closing an output file failed.
    #[error("Cannot close '{path}': {source}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rewriting a finished file with its header failed.
    #[error("Cannot backfill header into '{path}': {source}")]
    Backfill {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row could not be serialized to CSV text.
    #[error("Cannot serialize row: {0}")]
    Serialize(String),
}

impl OutputError {
    /// File the failure relates to, if any.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            OutputError::CreateDir { path, .. }
            | OutputError::Open { path, .. }
            | OutputError::Write { path, .. }
            | OutputError::Close { path, .. }
            | OutputError::Backfill { path, .. } => Some(path),
            OutputError::Serialize(_) => None,
        }
    }
}

// =============================================================================
// Split Errors (top-level)
// =============================================================================

/// Top-level error returned by the engine and the pipeline.
#[derive(Debug, Error)]
pub enum SplitError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Input error.
    #[error("Input error: {0}")]
    Source(#[from] SourceError),

    /// Output error.
    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    /// The operator aborted the run at a malformed row.
    #[error("Run aborted by operator at line {line}")]
    Aborted { line: u64 },

    /// The input holds no rows at all.
    #[error("Input is empty")]
    EmptyInput,

    /// Summary or report files could not be written.
    #[error("Cannot write report '{path}': {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A fatal error together with the progress reached before it.
#[derive(Debug, Error)]
#[error("{error} (after {} rows read, {} files written)", .summary.rows_read, .summary.file_count)]
pub struct RunFailure {
    #[source]
    pub error: SplitError,
    pub summary: RunSummary,
}

/// Failures before the first row was read carry an empty summary.
impl From<SplitError> for RunFailure {
    fn from(error: SplitError) -> Self {
        Self {
            error,
            summary: RunSummary::default(),
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for output operations.
pub type OutputResult<T> = Result<T, OutputError>;

/// Result type for engine and pipeline operations.
pub type SplitResult<T> = Result<T, SplitError>;
