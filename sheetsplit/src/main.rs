//! Sheetsplit CLI - split large CSV exports into filtered, categorized chunks
//!
//! # Commands
//!
//! ```bash
//! sheetsplit split sales.csv -g country -s 10MB   # One file set per country, 10 MB max
//! sheetsplit split sales.csv -f status=shipped    # Keep shipped rows only
//! sheetsplit inspect sales.csv                    # Show encoding, delimiter, columns
//! sheetsplit example-config                       # Print an example JSON config
//! ```

use clap::{Args, Parser, Subcommand};
use sheetsplit::config::parse_filter_arg;
use sheetsplit::{
    inspect_file, render_table, split_file, AutoSkip, ByteSize, ColumnRef, FilterValue, Header,
    HeaderPlacement, MatchPolicy, OperatorPrompt, RowDecision, RowError, Scalar, SplitConfig,
    SplitOptions,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sheetsplit")]
#[command(about = "Split large CSV files into filtered, categorized, size-bounded chunks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a CSV (or JSON rows) file
    Split(SplitArgs),

    /// Show detected encoding, delimiter, columns and a few rows
    Inspect {
        /// Input file
        input: PathBuf,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long, value_parser = parse_char)]
        delimiter: Option<char>,

        /// Input has no header row
        #[arg(long)]
        no_header: bool,

        /// Rows to drop before the header
        #[arg(long, default_value = "0")]
        skip_rows: u64,

        /// Number of rows to preview
        #[arg(short = 'n', long, default_value = "5")]
        rows: usize,
    },

    /// Show an example JSON configuration
    ExampleConfig,
}

#[derive(Args)]
struct SplitArgs {
    /// Input file (.csv or .json)
    input: PathBuf,

    /// Output root directory
    #[arg(short, long, env = "SHEETSPLIT_OUTPUT_DIR", default_value = "output")]
    output: PathBuf,

    /// JSON configuration file (flags override it)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Category column, by name or #N (repeatable)
    #[arg(short = 'g', long = "category")]
    category: Vec<String>,

    /// Do not categorize (and do not ask)
    #[arg(long, conflicts_with = "category")]
    no_category: bool,

    /// Rotate files past this size (e.g. 512KB, 10MB)
    #[arg(short = 's', long)]
    max_size: Option<String>,

    /// Keep rows where COLUMN equals VALUE (repeatable). true/false, null and
    /// plain numbers are typed; anything else, e.g. 02134, matches as text
    #[arg(short = 'f', long = "filter", value_name = "COLUMN=VALUE")]
    filter: Vec<String>,

    /// Keep rows where COLUMN matches PATTERN (repeatable)
    #[arg(short = 'r', long = "filter-regex", value_name = "COLUMN=PATTERN")]
    filter_regex: Vec<String>,

    /// Keep rows where COLUMN is present and non-empty (repeatable)
    #[arg(long, value_name = "COLUMN")]
    require: Vec<String>,

    /// How filters combine: all, any, none
    #[arg(short = 'm', long = "match")]
    match_policy: Option<MatchPolicy>,

    /// Header placement: shared, per-file, backfill
    #[arg(long)]
    header_placement: Option<HeaderPlacement>,

    /// Input has no header row
    #[arg(long)]
    no_header: bool,

    /// Stop after this many rows
    #[arg(short = 'l', long)]
    limit: Option<u64>,

    /// Rows to drop before the header
    #[arg(long)]
    skip_rows: Option<u64>,

    /// CSV delimiter (auto-detect if not specified; "tab" for TAB)
    #[arg(short, long, value_parser = parse_char)]
    delimiter: Option<char>,

    /// CSV quote character
    #[arg(long, value_parser = parse_char)]
    quote: Option<char>,

    /// CSV escape character (quotes are doubled if not specified)
    #[arg(long, value_parser = parse_char)]
    escape: Option<char>,

    /// Delimiter of the output files
    #[arg(long, value_parser = parse_char)]
    output_delimiter: Option<char>,

    /// Base name of the output files (default: input file name)
    #[arg(long)]
    name: Option<String>,

    /// Write directly into the output root instead of a timestamped directory
    #[arg(long)]
    no_run_dir: bool,

    /// Ask about malformed rows and missing category columns
    #[arg(short, long)]
    interactive: bool,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Split(args) => cmd_split(args).await,

        Commands::Inspect {
            input,
            delimiter,
            no_header,
            skip_rows,
            rows,
        } => cmd_inspect(&input, delimiter, no_header, skip_rows, rows),

        Commands::ExampleConfig => cmd_example_config(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn cmd_split(args: SplitArgs) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Processing: {}", args.input.display());

    let config = build_config(&args)?;
    let options = SplitOptions {
        output_root: args.output.clone(),
        run_dir: !args.no_run_dir,
        base_name: args.name.clone(),
    };
    let prompt: Box<dyn OperatorPrompt + Send> = if args.interactive {
        Box::new(StdinPrompt)
    } else {
        Box::new(AutoSkip)
    };

    let outcome = split_file(&args.input, &config, options, prompt).await?;

    println!("\n{}", render_table(&outcome.report));
    eprintln!(
        "\n📊 Report: {}",
        outcome.output_dir.join(sheetsplit::report::REPORT_FILE).display()
    );
    eprintln!("\n✨ Done!");
    Ok(())
}

/// Config file (if any) with command-line flags applied on top.
fn build_config(args: &SplitArgs) -> Result<SplitConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => SplitConfig::from_file(path)?,
        None => SplitConfig::default(),
    };

    if args.no_category {
        config.category_fields = Some(Vec::new());
    } else if !args.category.is_empty() {
        config.category_fields = Some(args.category.clone());
    }
    if let Some(size) = &args.max_size {
        config.max_file_size = Some(ByteSize::Text(size.clone()));
    }

    for raw in &args.filter {
        let (column, value) = parse_filter_arg(raw)?;
        config
            .filters
            .entry(column)
            .or_default()
            .push(FilterValue::Literal(Scalar::parse_literal(&value)));
    }
    for raw in &args.filter_regex {
        let (column, regex) = parse_filter_arg(raw)?;
        config
            .filters
            .entry(column)
            .or_default()
            .push(FilterValue::Regex { regex });
    }
    for column in &args.require {
        config.filters.entry(column.clone()).or_default();
    }

    if let Some(policy) = args.match_policy {
        config.match_policy = policy;
    }
    if let Some(placement) = args.header_placement {
        config.header_placement = placement;
    }
    if args.no_header {
        config.has_header = false;
    }
    if let Some(limit) = args.limit {
        config.row_count_limit = Some(limit);
    }
    if let Some(skip) = args.skip_rows {
        config.skip_leading_rows = skip;
    }
    if let Some(d) = args.delimiter {
        config.delimiter = Some(d);
    }
    if let Some(q) = args.quote {
        config.quote = q;
    }
    if let Some(e) = args.escape {
        config.escape = Some(e);
    }
    if let Some(d) = args.output_delimiter {
        config.output_delimiter = d;
    }

    Ok(config)
}

fn cmd_inspect(
    input: &Path,
    delimiter: Option<char>,
    no_header: bool,
    skip_rows: u64,
    rows: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("🔍 Inspecting: {}", input.display());

    let config = SplitConfig {
        delimiter,
        has_header: !no_header,
        skip_leading_rows: skip_rows,
        ..SplitConfig::default()
    };
    let inspection = inspect_file(input, &config, rows)?;

    eprintln!("   Encoding: {}", inspection.encoding);
    if let Some(d) = inspection.delimiter {
        eprintln!(
            "   Delimiter: '{}'{}",
            sheetsplit::parser::format_delimiter(d),
            if delimiter.is_none() { " (auto-detected)" } else { "" }
        );
    }
    eprintln!("\n📋 {} columns:", inspection.header.len());
    for (i, name) in inspection.header.iter().enumerate() {
        eprintln!("   [{:2}] {}", i + 1, name);
    }

    eprintln!("\n👀 Preview:");
    for row in &inspection.preview {
        println!("{}", row.join(" | "));
    }
    if inspection.malformed > 0 {
        eprintln!("\n⚠️  {} malformed rows in the preview", inspection.malformed);
    }
    Ok(())
}

fn cmd_example_config() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", SplitConfig::example().to_json()?);
    Ok(())
}

/// Single character argument; `tab` and `\t` mean TAB.
fn parse_char(raw: &str) -> Result<char, String> {
    match raw {
        "tab" | "TAB" | "\\t" => return Ok('\t'),
        _ => {}
    }
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(format!("expected a single character, got '{}'", raw)),
    }
}

// =============================================================================
// Interactive prompts
// =============================================================================

/// Asks the operator on stderr/stdin. End of input answers with the defaults.
struct StdinPrompt;

impl OperatorPrompt for StdinPrompt {
    fn on_malformed(&mut self, error: &RowError) -> RowDecision {
        eprintln!("\n⚠️  {}", error);
        loop {
            let Some(answer) = ask("   [s]kip, skip [a]ll, a[b]ort? ") else {
                return RowDecision::Skip;
            };
            match answer.to_lowercase().as_str() {
                "" | "s" | "skip" => return RowDecision::Skip,
                "a" | "all" => return RowDecision::SkipAll,
                "b" | "abort" => return RowDecision::Abort,
                _ => eprintln!("   Please answer s, a or b."),
            }
        }
    }

    fn choose_category_fields(&mut self, header: &Header) -> Vec<ColumnRef> {
        eprintln!("\n📋 Columns:");
        for (i, name) in header.names().iter().enumerate() {
            eprintln!("   [{:2}] {}", i + 1, name);
        }

        'ask: loop {
            let Some(answer) =
                ask("   Category columns (numbers or names, comma-separated, empty for none): ")
            else {
                return Vec::new();
            };

            let mut fields = Vec::new();
            for part in answer.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let field = match part.parse::<usize>() {
                    Ok(n) if n >= 1 && n <= header.len() => ColumnRef::Index(n - 1),
                    _ if header.position(part).is_some() => ColumnRef::Name(part.to_string()),
                    _ => {
                        eprintln!("   Unknown column '{}'", part);
                        continue 'ask;
                    }
                };
                fields.push(field);
            }
            return fields;
        }
    }
}

/// Print `question` and read one line. `None` at end of input.
fn ask(question: &str) -> Option<String> {
    eprint!("{}", question);
    io::stderr().flush().ok();

    let mut line = String::new();
    match io::stdin().read_line(&mut line) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(line.trim().to_string()),
    }
}
