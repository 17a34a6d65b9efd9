//! Run configuration.
//!
//! [`SplitConfig`] is the serde view (JSON config file, CLI overrides);
//! [`SplitConfig::compile`] validates it into [`SplitSettings`], which is what
//! the engine consumes. All configuration errors surface here, before any
//! output is produced.
//!
//! ```json
//! {
//!   "category_fields": ["country"],
//!   "max_file_size": "10MB",
//!   "match_policy": "all",
//!   "filters": { "status": ["shipped", {"regex": "^pend"}] },
//!   "header_placement": "per_file"
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::filter::{ColumnRef, FilterSpec, FilterValue, MatchPolicy};
use crate::output::HeaderPlacement;
use crate::parser::CsvOptions;

/// Rows between progress events.
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

// =============================================================================
// Sizes
// =============================================================================

/// A byte size: a plain number or text such as `"64KB"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ByteSize {
    Bytes(u64),
    Text(String),
}

impl ByteSize {
    pub fn to_bytes(&self) -> ConfigResult<u64> {
        match self {
            ByteSize::Bytes(0) => Err(ConfigError::InvalidSize("0".to_string())),
            ByteSize::Bytes(n) => Ok(*n),
            ByteSize::Text(s) => parse_byte_size(s),
        }
    }
}

/// Parse `512`, `64KB`, `1.5MB`, `2GB` (binary multiples; `K`/`KiB` also accepted).
pub fn parse_byte_size(raw: &str) -> ConfigResult<u64> {
    let invalid = || ConfigError::InvalidSize(raw.to_string());
    let text = raw.trim();
    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (number, unit) = text.split_at(split);

    let value: f64 = number.parse().map_err(|_| invalid())?;
    let multiplier: u64 = match unit.trim().to_ascii_uppercase().as_str() {
        "" | "B" => 1,
        "K" | "KB" | "KIB" => 1024,
        "M" | "MB" | "MIB" => 1024 * 1024,
        "G" | "GB" | "GIB" => 1024 * 1024 * 1024,
        _ => return Err(invalid()),
    };

    let bytes = (value * multiplier as f64).floor();
    if !bytes.is_finite() || bytes < 1.0 {
        return Err(invalid());
    }
    Ok(bytes as u64)
}

/// Human-readable byte count for reports.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

// =============================================================================
// Split configuration
// =============================================================================

/// Configuration of one split run, as written in a config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Columns that form the category. `None` means "ask the operator".
    pub category_fields: Option<Vec<String>>,
    /// Rotate files once they would exceed this size.
    pub max_file_size: Option<ByteSize>,
    pub match_policy: MatchPolicy,
    /// Column (`name` or `#N`) to accepted values.
    pub filters: BTreeMap<String, Vec<FilterValue>>,
    /// First row is a header row.
    pub has_header: bool,
    pub header_placement: HeaderPlacement,
    /// Stop after this many data rows.
    pub row_count_limit: Option<u64>,
    /// Rows dropped before the header (report titles, blank lines).
    pub skip_leading_rows: u64,
    /// Rows between progress events; 0 disables them.
    pub progress_interval: u64,
    /// Input delimiter; auto-detected when unset.
    pub delimiter: Option<char>,
    pub quote: char,
    pub escape: Option<char>,
    pub output_delimiter: char,
    /// Output file name prefix; defaults to the input file stem.
    pub base_name: Option<String>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            category_fields: None,
            max_file_size: None,
            match_policy: MatchPolicy::All,
            filters: BTreeMap::new(),
            has_header: true,
            header_placement: HeaderPlacement::PerFile,
            row_count_limit: None,
            skip_leading_rows: 0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            delimiter: None,
            quote: '"',
            escape: None,
            output_delimiter: ',',
            base_name: None,
        }
    }
}

impl SplitConfig {
    /// Load a JSON config file.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Validate and compile into engine settings.
    pub fn compile(&self) -> ConfigResult<SplitSettings> {
        let category_fields = self
            .category_fields
            .as_ref()
            .map(|fields| {
                fields
                    .iter()
                    .map(|f| ColumnRef::parse(f))
                    .collect::<ConfigResult<Vec<_>>>()
            })
            .transpose()?;

        let max_file_size = self
            .max_file_size
            .as_ref()
            .map(ByteSize::to_bytes)
            .transpose()?;

        let csv = CsvOptions {
            delimiter: self
                .delimiter
                .map(|c| ascii_byte("delimiter", c))
                .transpose()?,
            quote: ascii_byte("quote", self.quote)?,
            escape: self.escape.map(|c| ascii_byte("escape", c)).transpose()?,
            skip_lines: self.skip_leading_rows,
        };

        Ok(SplitSettings {
            category_fields,
            max_file_size,
            match_policy: self.match_policy,
            filter: FilterSpec::compile(&self.filters)?,
            has_header: self.has_header,
            header_placement: self.header_placement,
            row_count_limit: self.row_count_limit,
            skip_leading_rows: self.skip_leading_rows,
            progress_interval: self.progress_interval,
            output_delimiter: ascii_byte("output delimiter", self.output_delimiter)?,
            csv,
        })
    }

    /// A documented example, printed by `sheetsplit example-config`.
    pub fn example() -> Self {
        let mut filters = BTreeMap::new();
        filters.insert(
            "Status".to_string(),
            vec![
                FilterValue::Literal("Shipped".into()),
                FilterValue::Regex {
                    regex: "^Pending".to_string(),
                },
            ],
        );
        filters.insert("#1".to_string(), vec![]);

        Self {
            category_fields: Some(vec!["Country".to_string()]),
            max_file_size: Some(ByteSize::Text("10MB".to_string())),
            filters,
            row_count_limit: Some(500_000),
            ..Self::default()
        }
    }
}

/// Split a `COLUMN=VALUE` command-line argument at the first `=`.
pub fn parse_filter_arg(raw: &str) -> ConfigResult<(String, String)> {
    match raw.split_once('=') {
        Some((column, value)) if !column.trim().is_empty() => {
            Ok((column.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::InvalidFilter(raw.to_string())),
    }
}

fn ascii_byte(role: &'static str, value: char) -> ConfigResult<u8> {
    if value.is_ascii() {
        Ok(value as u8)
    } else {
        Err(ConfigError::InvalidChar { role, value })
    }
}

/// Validated settings consumed by the engine.
#[derive(Debug, Clone)]
pub struct SplitSettings {
    pub category_fields: Option<Vec<ColumnRef>>,
    pub max_file_size: Option<u64>,
    pub match_policy: MatchPolicy,
    pub filter: FilterSpec,
    pub has_header: bool,
    pub header_placement: HeaderPlacement,
    pub row_count_limit: Option<u64>,
    pub skip_leading_rows: u64,
    pub progress_interval: u64,
    pub output_delimiter: u8,
    pub csv: CsvOptions,
}

impl Default for SplitSettings {
    fn default() -> Self {
        Self {
            category_fields: Some(Vec::new()),
            max_file_size: None,
            match_policy: MatchPolicy::All,
            filter: FilterSpec::new(),
            has_header: true,
            header_placement: HeaderPlacement::PerFile,
            row_count_limit: None,
            skip_leading_rows: 0,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            output_delimiter: b',',
            csv: CsvOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SplitConfig::default();
        assert!(config.has_header);
        assert_eq!(config.match_policy, MatchPolicy::All);
        assert_eq!(config.header_placement, HeaderPlacement::PerFile);
        assert_eq!(config.progress_interval, 1000);
    }

    #[test]
    fn test_parse_byte_size() {
        assert_eq!(parse_byte_size("512").unwrap(), 512);
        assert_eq!(parse_byte_size("64KB").unwrap(), 64 * 1024);
        assert_eq!(parse_byte_size("1.5 mb").unwrap(), 1024 * 1024 * 3 / 2);
        assert_eq!(parse_byte_size("2G").unwrap(), 2 * 1024 * 1024 * 1024);
        assert!(parse_byte_size("ten").is_err());
        assert!(parse_byte_size("5 parsecs").is_err());
        assert!(parse_byte_size("0").is_err());
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(900), "900 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(10 * 1024 * 1024), "10.0 MB");
    }

    #[test]
    fn test_config_from_json() {
        let json = r##"{
            "category_fields": ["country", "#2"],
            "max_file_size": 1024,
            "match_policy": "any",
            "filters": {"status": ["true", {"regex": "^ok"}]},
            "header_placement": "shared",
            "skip_leading_rows": 2,
            "delimiter": ";"
        }"##;
        let config = SplitConfig::from_json(json).unwrap();
        assert!(config.has_header);
        let settings = config.compile().unwrap();
        assert_eq!(
            settings.category_fields,
            Some(vec![ColumnRef::Name("country".into()), ColumnRef::Index(1)])
        );
        assert_eq!(settings.max_file_size, Some(1024));
        assert_eq!(settings.match_policy, MatchPolicy::Any);
        assert_eq!(settings.header_placement, HeaderPlacement::Shared);
        assert_eq!(settings.csv.delimiter, Some(b';'));
        assert_eq!(settings.skip_leading_rows, 2);
        assert_eq!(settings.csv.skip_lines, 2);
        assert_eq!(settings.filter.fields().len(), 1);
    }

    #[test]
    fn test_compile_rejects_bad_values() {
        let mut config = SplitConfig::default();
        config.max_file_size = Some(ByteSize::Text("lots".into()));
        assert!(matches!(config.compile(), Err(ConfigError::InvalidSize(_))));

        let mut config = SplitConfig::default();
        config.output_delimiter = '§';
        assert!(matches!(config.compile(), Err(ConfigError::InvalidChar { .. })));

        let mut config = SplitConfig::default();
        config.category_fields = Some(vec!["  ".into()]);
        assert!(matches!(config.compile(), Err(ConfigError::InvalidColumn(_))));

        let mut config = SplitConfig::default();
        config
            .filters
            .insert("a".into(), vec![FilterValue::Regex { regex: "[".into() }]);
        assert!(matches!(config.compile(), Err(ConfigError::InvalidRegex { .. })));
    }

    #[test]
    fn test_parse_filter_arg() {
        assert_eq!(
            parse_filter_arg("status=a=b").unwrap(),
            ("status".to_string(), "a=b".to_string())
        );
        assert_eq!(
            parse_filter_arg("#2=").unwrap(),
            ("#2".to_string(), String::new())
        );
        assert!(matches!(
            parse_filter_arg("status"),
            Err(ConfigError::InvalidFilter(_))
        ));
        assert!(parse_filter_arg("=x").is_err());
    }

    #[test]
    fn test_example_round_trips() {
        let example = SplitConfig::example();
        let parsed = SplitConfig::from_json(&example.to_json().unwrap()).unwrap();
        assert_eq!(parsed, example);
        assert!(parsed.compile().is_ok());
    }

    #[test]
    fn test_unreadable_config_file() {
        let err = SplitConfig::from_file(Path::new("/no/such/config.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
