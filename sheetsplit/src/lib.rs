//! # Sheetsplit - split large CSV exports into filtered, categorized chunks
//!
//! Sheetsplit reads a CSV file (or a spreadsheet range flattened to rows),
//! keeps the rows that pass a filter, groups them by category and writes each
//! group to its own size-bounded CSV files.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  CSV / JSON │────▶│   Parser    │────▶│   Engine    │────▶│  CSV files  │
//! │  (any enc)  │     │  (auto-enc) │     │ filter+route│     │ + report    │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sheetsplit::{split_file, AutoSkip, SplitConfig, SplitOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = SplitConfig {
//!         category_fields: Some(vec!["country".into()]),
//!         ..SplitConfig::default()
//!     };
//!     let outcome = split_file("sales.csv".as_ref(), &config, SplitOptions::new("output"), Box::new(AutoSkip))
//!         .await
//!         .unwrap();
//!     println!("Wrote {} files", outcome.report.files.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Scalars, headers and rows
//! - [`parser`] - CSV and JSON row sources with auto-detection
//! - [`filter`] - Row filter (literal/regex, ALL/ANY/NONE)
//! - [`category`] - Category resolution
//! - [`output`] - File naming and the per-category file router
//! - [`engine`] - The split state machine
//! - [`config`] - Run configuration
//! - [`report`] - Run summary and report files
//! - [`progress`] - Status line broadcasting
//! - [`pipeline`] - End-to-end entry points

// Core modules
pub mod error;
pub mod models;

// Input
pub mod parser;

// Row processing
pub mod category;
pub mod filter;

// Output
pub mod output;

// Orchestration
pub mod config;
pub mod engine;
pub mod pipeline;
pub mod progress;
pub mod report;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, OutputError, RowError, RunFailure, SourceError, SplitError, SplitResult,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Header, NamedRow, Row, Scalar};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{
    detect_delimiter, detect_encoding, from_rows, open_input, CsvOptions, CsvSource, InputFormat,
    InputInfo, InputSource, JsonSource, RowResult, SourceRow,
};

// =============================================================================
// Re-exports - Filter and categories
// =============================================================================

pub use category::{resolve_category, DEFAULT_CATEGORY, EMPTY_CATEGORY};
pub use filter::{matches, ColumnRef, FilterSpec, FilterValue, MatchPolicy};

// =============================================================================
// Re-exports - Output
// =============================================================================

pub use output::{build_file_name, FileMetrics, FileNamer, HeaderPlacement};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use engine::{AutoSkip, EngineState, OperatorPrompt, RowDecision, SplitEngine};

// =============================================================================
// Re-exports - Config and report
// =============================================================================

pub use config::{parse_byte_size, ByteSize, SplitConfig, SplitSettings};
pub use report::{render_table, RunReport, RunSummary};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{
    inspect_file, prepare_output_dir, split_file, split_rows, Inspection, SplitOptions,
    SplitOutcome,
};
