//! The split engine.
//!
//! Drives one run over a row source:
//!
//! ```text
//! AwaitingHeader ─▶ Streaming ⇄ AwaitingOperatorDecision
//!                       │
//!                       ▼
//!                   Draining ─▶ Done
//!
//! (any state) ─▶ Failed
//! ```
//!
//! One row is filtered, categorized, routed and written before the next one
//! is pulled. The engine owns the [`RouterState`]; nothing else touches it.

use csv::{Terminator, WriterBuilder};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::category::resolve_category;
use crate::config::SplitSettings;
use crate::error::{
    OutputError, OutputResult, RowError, RunFailure, SourceError, SplitError, SplitResult,
};
use crate::filter::{self, ColumnRef};
use crate::models::{Header, Row};
use crate::output::{
    backfill_headers, header_file_name, write_shared_header, FileNamer, HeaderPlacement,
    OutputRouter, RouterSettings, RouterState,
};
use crate::parser::{RowResult, SourceRow};
use crate::progress::{log_info, log_warning};
use crate::report::{RowCounters, RunReport, RunSummary};

// =============================================================================
// States and operator decisions
// =============================================================================

/// Where the engine is in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    AwaitingHeader,
    Streaming,
    AwaitingOperatorDecision,
    Draining,
    Done,
    Failed,
}

/// Answer to a malformed row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowDecision {
    /// Count the row as skipped and continue.
    Skip,
    /// Skip this and every later malformed row without asking again.
    SkipAll,
    /// Stop the run.
    Abort,
}

/// Decisions the engine cannot make on its own.
///
/// Calls block row consumption until they return.
pub trait OperatorPrompt {
    /// Called for a malformed row.
    fn on_malformed(&mut self, _error: &RowError) -> RowDecision {
        RowDecision::Skip
    }

    /// Called once the header is known and no category fields are configured.
    /// An empty list means no categorization.
    fn choose_category_fields(&mut self, _header: &Header) -> Vec<ColumnRef> {
        Vec::new()
    }
}

/// Non-interactive prompt: skips malformed rows, no categories.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoSkip;

impl OperatorPrompt for AutoSkip {}

// =============================================================================
// Engine
// =============================================================================

/// What the header phase hands to the streaming phase.
struct RunContext {
    header: Arc<Header>,
    header_line: Option<Vec<u8>>,
    category_fields: Vec<ColumnRef>,
}

/// Runs one split.
pub struct SplitEngine {
    settings: SplitSettings,
    output_dir: PathBuf,
    base_name: String,
    prompt: Box<dyn OperatorPrompt + Send>,
    ask_operator: bool,
    state: EngineState,
    routes: RouterState,
    counters: RowCounters,
    header: Option<Arc<Header>>,
    header_file: Option<String>,
}

impl SplitEngine {
    /// `output_dir` must exist.
    pub fn new(settings: SplitSettings, output_dir: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            settings,
            output_dir: output_dir.into(),
            base_name: base_name.into(),
            prompt: Box::new(AutoSkip),
            ask_operator: true,
            state: EngineState::AwaitingHeader,
            routes: RouterState::new(),
            counters: RowCounters::default(),
            header: None,
            header_file: None,
        }
    }

    pub fn with_prompt(mut self, prompt: Box<dyn OperatorPrompt + Send>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Process every row of `rows`.
    ///
    /// On failure every open file is closed (best effort) and the counts
    /// reached so far travel with the error.
    pub async fn run<I>(mut self, rows: I) -> Result<RunReport, RunFailure>
    where
        I: IntoIterator<Item = RowResult>,
    {
        let mut rows = rows.into_iter();
        match self.drive(&mut rows).await {
            Ok(report) => Ok(report),
            Err(error) => {
                self.state = EngineState::Failed;
                self.routes.close_all_best_effort().await;
                warn!(error = %error, rows_read = self.counters.read, "Split failed");
                Err(RunFailure {
                    error,
                    summary: self.summary(),
                })
            }
        }
    }

    async fn drive<I>(&mut self, rows: &mut I) -> SplitResult<RunReport>
    where
        I: Iterator<Item = RowResult>,
    {
        let (mut router, context, pending) = self.await_header(rows).await?;

        self.state = EngineState::Streaming;
        for item in pending.into_iter().chain(rows.by_ref()) {
            if self.limit_reached() {
                self.counters.limit_reached = true;
                debug!(limit = ?self.settings.row_count_limit, "Row limit reached");
                break;
            }
            self.consume(&mut router, &context, item).await?;
            self.report_progress();
        }

        self.state = EngineState::Draining;
        debug!(open = self.routes.open_count(), "Closing output files");
        self.routes.close_all().await?;

        if self.settings.header_placement == HeaderPlacement::Backfill {
            if let Some(header) = &context.header_line {
                if self.routes.file_count() > 0 {
                    log_warning(format!(
                        "Backfilling the header into {} files (each file is rewritten)",
                        self.routes.file_count()
                    ));
                }
                backfill_headers(&self.routes, header).await?;
            }
        }

        self.state = EngineState::Done;
        Ok(self.report(&router))
    }

    /// Skip leading rows, derive the header and set up the router.
    ///
    /// Returns the first data row when the header row is also data.
    async fn await_header<I>(
        &mut self,
        rows: &mut I,
    ) -> SplitResult<(OutputRouter, RunContext, Option<RowResult>)>
    where
        I: Iterator<Item = RowResult>,
    {
        self.state = EngineState::AwaitingHeader;

        for _ in 0..self.settings.skip_leading_rows {
            match rows.next() {
                None => return Err(SplitError::EmptyInput),
                Some(Err(e)) if !e.is_skippable() => return Err(e.into()),
                Some(_) => {}
            }
        }

        let SourceRow { line, row } = rows.next().ok_or(SplitError::EmptyInput)??;

        let (header, pending, writes_header) = match row {
            Row::Keyed(pairs) => {
                let header = Header::from_names(pairs.iter().map(|(k, _)| k.clone()));
                let row = Row::Keyed(pairs);
                (header, Some(Ok(SourceRow { line, row })), true)
            }
            Row::Positional(values) if self.settings.has_header => {
                (Header::from_values(&values), None, true)
            }
            Row::Positional(values) => {
                let header = Header::synthesized(values.len());
                let row = Row::Positional(values);
                (header, Some(Ok(SourceRow { line, row })), false)
            }
        };
        let header = Arc::new(header);
        debug!(columns = header.len(), "Header resolved");
        if header.is_empty() {
            log_warning("The header has no columns");
        }

        let category_fields = match &self.settings.category_fields {
            Some(fields) => fields.clone(),
            None => self.prompt.choose_category_fields(&header),
        };

        let filter_columns = self.settings.filter.fields().iter().map(|f| &f.column);
        for column in category_fields.iter().chain(filter_columns) {
            if !column_exists(&header, column) {
                warn!(%column, "Column not in header");
                log_warning(format!("Column '{}' is not in the header", column));
            }
        }

        let header_line = if writes_header {
            Some(serialize_record(header.names(), self.settings.output_delimiter)?)
        } else {
            None
        };

        let filtered = !self.settings.filter.is_empty();
        let mut namer = FileNamer::new(self.base_name.clone(), filtered);

        if self.settings.header_placement == HeaderPlacement::Shared {
            if let Some(line) = &header_line {
                let name = header_file_name(&self.base_name);
                write_shared_header(&self.output_dir, &name, line).await?;
                namer.reserve(&name);
                self.header_file = Some(name);
            }
        }

        let router = OutputRouter::new(
            RouterSettings {
                output_dir: self.output_dir.clone(),
                max_file_size: self.settings.max_file_size,
                header_placement: self.settings.header_placement,
                header_line: header_line.clone(),
                filter: filtered.then(|| self.settings.filter.snapshot(self.settings.match_policy)),
            },
            namer,
        );

        self.header = Some(Arc::clone(&header));
        let context = RunContext {
            header,
            header_line,
            category_fields,
        };
        Ok((router, context, pending))
    }

    /// Filter, categorize, route and write one row.
    async fn consume(
        &mut self,
        router: &mut OutputRouter,
        context: &RunContext,
        item: RowResult,
    ) -> SplitResult<()> {
        let SourceRow { line, row } = match item {
            Ok(row) => row,
            Err(SourceError::Row(error)) => {
                self.counters.read += 1;
                return self.malformed(error);
            }
            Err(fatal) => return Err(fatal.into()),
        };
        self.counters.read += 1;

        let named = match row.resolve(&context.header, line) {
            Ok(named) => named,
            Err(error) => return self.malformed(error),
        };

        if !filter::matches(&named, &self.settings.filter, self.settings.match_policy) {
            self.counters.filtered += 1;
            return Ok(());
        }

        let category = resolve_category(&named, &context.category_fields);
        let texts: Vec<_> = named.values().iter().map(|v| v.to_text()).collect();
        let bytes = serialize_record(
            texts.iter().map(|t| t.as_bytes()),
            self.settings.output_delimiter,
        )?;

        let file = router
            .route(&mut self.routes, &category, bytes.len() as u64)
            .await?;
        file.write_row(&bytes).await?;
        Ok(())
    }

    /// Count a malformed row and, unless told otherwise, ask the operator.
    fn malformed(&mut self, error: RowError) -> SplitResult<()> {
        self.counters.malformed += 1;
        debug!(line = error.line(), error = %error, "Malformed row");

        if !self.ask_operator {
            return Ok(());
        }

        self.state = EngineState::AwaitingOperatorDecision;
        let decision = self.prompt.on_malformed(&error);
        self.state = EngineState::Streaming;

        match decision {
            RowDecision::Skip => Ok(()),
            RowDecision::SkipAll => {
                self.ask_operator = false;
                Ok(())
            }
            RowDecision::Abort => Err(SplitError::Aborted { line: error.line() }),
        }
    }

    fn limit_reached(&self) -> bool {
        self.settings
            .row_count_limit
            .is_some_and(|limit| self.counters.read >= limit)
    }

    fn report_progress(&self) {
        let interval = self.settings.progress_interval;
        if interval > 0 && self.counters.read % interval == 0 {
            let c = &self.counters;
            log_info(format!(
                "{} rows read, {} written",
                c.read,
                c.read - c.malformed - c.filtered
            ));
        }
    }

    fn summary(&self) -> RunSummary {
        RunSummary::from_files(
            self.counters,
            &self.routes.metrics(),
            self.routes.categories().len(),
        )
    }

    fn report(&self, router: &OutputRouter) -> RunReport {
        let settings = router.settings();
        RunReport {
            base_name: self.base_name.clone(),
            output_dir: self.output_dir.clone(),
            generated_at: chrono::Local::now().to_rfc3339(),
            header_placement: settings.header_placement,
            header_file: self.header_file.clone(),
            header: self
                .header
                .as_ref()
                .map(|h| h.names().to_vec())
                .unwrap_or_default(),
            filter: settings.filter.clone(),
            summary: self.summary(),
            files: self.routes.metrics(),
        }
    }
}

fn column_exists(header: &Header, column: &ColumnRef) -> bool {
    match column {
        ColumnRef::Name(name) => header.position(name).is_some(),
        ColumnRef::Index(i) => *i < header.len(),
    }
}

/// One CSV record, newline-terminated.
fn serialize_record<I, T>(fields: I, delimiter: u8) -> OutputResult<Vec<u8>>
where
    I: IntoIterator<Item = T>,
    T: AsRef<[u8]>,
{
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(fields)
        .map_err(|e| OutputError::Serialize(e.to_string()))?;
    writer
        .into_inner()
        .map_err(|e| OutputError::Serialize(e.error().to_string()))
}
