//! Row filtering.
//!
//! A [`FilterSpec`] maps column references to accepted values. Each accepted
//! value is a literal or a regex; a column with no accepted values only
//! requires the column to be present and non-empty. Fields are combined with a
//! [`MatchPolicy`].
//!
//! ```text
//! status = ["shipped", /^pend/]   ┐
//! region = ["EU"]                 ├─ ALL / ANY / NONE ─▶ keep row?
//! #3     = []  (non-empty)        ┘
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;
use crate::models::{NamedRow, Scalar};

// =============================================================================
// Match Policy
// =============================================================================

/// How per-field results combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// Every field must match.
    #[default]
    All,
    /// At least one field must match.
    Any,
    /// No field may match.
    None,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(MatchPolicy::All),
            "any" => Ok(MatchPolicy::Any),
            "none" => Ok(MatchPolicy::None),
            other => Err(format!("unknown match policy '{}' (all, any, none)", other)),
        }
    }
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MatchPolicy::All => "ALL",
            MatchPolicy::Any => "ANY",
            MatchPolicy::None => "NONE",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Column references and matchers
// =============================================================================

/// A column, by header name or by 0-based position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnRef {
    Name(String),
    Index(usize),
}

impl ColumnRef {
    /// Parse `#N` (1-based position) or a header name.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ConfigError::InvalidColumn(raw.to_string()));
        }
        if let Some(number) = trimmed.strip_prefix('#') {
            return match number.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(ColumnRef::Index(n - 1)),
                _ => Err(ConfigError::InvalidColumn(raw.to_string())),
            };
        }
        Ok(ColumnRef::Name(trimmed.to_string()))
    }

    /// Look the column up in a row. `None` when the row has no such column.
    pub fn lookup<'r>(&self, row: &'r NamedRow) -> Option<&'r Scalar> {
        match self {
            ColumnRef::Name(name) => row.get(name),
            ColumnRef::Index(i) => row.get_index(*i),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRef::Name(name) => f.write_str(name),
            ColumnRef::Index(i) => write!(f, "#{}", i + 1),
        }
    }
}

/// One accepted value of a filter field.
#[derive(Debug, Clone)]
pub enum Matcher {
    Literal(Scalar),
    Pattern(Regex),
}

impl Matcher {
    pub fn matches(&self, value: &Scalar) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(&value.to_text()),
            Matcher::Literal(literal) => literal_matches(literal, value),
        }
    }
}

impl fmt::Display for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Matcher::Literal(Scalar::Null) => f.write_str("null"),
            Matcher::Literal(literal) => write!(f, "{}", literal),
            Matcher::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

/// Strict equality after coercing `value` to the literal's type.
fn literal_matches(literal: &Scalar, value: &Scalar) -> bool {
    match literal {
        Scalar::Null => value.is_empty(),
        Scalar::Bool(expected) => value.as_bool() == Some(*expected),
        Scalar::Number(expected) => value.as_number() == Some(*expected),
        Scalar::String(expected) => value.to_text() == expected.as_str(),
    }
}

/// Accepted value as written in a configuration file.
///
/// `{"regex": "..."}` is a pattern; any scalar is a literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Regex { regex: String },
    Literal(Scalar),
}

impl FilterValue {
    fn compile(&self, column: &str) -> Result<Matcher, ConfigError> {
        match self {
            FilterValue::Literal(literal) => Ok(Matcher::Literal(literal.clone())),
            FilterValue::Regex { regex } => Regex::new(regex)
                .map(Matcher::Pattern)
                .map_err(|source| ConfigError::InvalidRegex {
                    column: column.to_string(),
                    pattern: regex.clone(),
                    source,
                }),
        }
    }
}

// =============================================================================
// Filter Spec
// =============================================================================

/// A compiled filter field.
#[derive(Debug, Clone)]
pub struct FilterField {
    pub column: ColumnRef,
    pub accepted: Vec<Matcher>,
}

impl FilterField {
    /// Any accepted value matches; no accepted values means "present and non-empty".
    pub fn matches(&self, row: &NamedRow) -> bool {
        match self.column.lookup(row) {
            None => false,
            Some(value) if self.accepted.is_empty() => !value.is_empty(),
            Some(value) => self.accepted.iter().any(|m| m.matches(value)),
        }
    }
}

/// Compiled filter fields, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    fields: Vec<FilterField>,
}

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile raw `column -> accepted values` entries. Regexes are checked here.
    pub fn compile<'a, I>(entries: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (&'a String, &'a Vec<FilterValue>)>,
    {
        let mut spec = Self::new();
        for (column, values) in entries {
            let accepted = values
                .iter()
                .map(|v| v.compile(column))
                .collect::<Result<Vec<_>, _>>()?;
            spec.push(ColumnRef::parse(column)?, accepted);
        }
        Ok(spec)
    }

    /// Add accepted values for a column, merging with an existing entry.
    pub fn push(&mut self, column: ColumnRef, accepted: Vec<Matcher>) {
        match self.fields.iter_mut().find(|f| f.column == column) {
            Some(field) => field.accepted.extend(accepted),
            None => self.fields.push(FilterField { column, accepted }),
        }
    }

    pub fn fields(&self) -> &[FilterField] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Printable copy for reports.
    pub fn snapshot(&self, policy: MatchPolicy) -> FilterSnapshot {
        FilterSnapshot {
            policy,
            fields: self
                .fields
                .iter()
                .map(|f| {
                    let values = f.accepted.iter().map(|m| m.to_string()).collect();
                    (f.column.to_string(), values)
                })
                .collect(),
        }
    }
}

/// Filter description recorded on each output file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSnapshot {
    pub policy: MatchPolicy,
    pub fields: Vec<(String, Vec<String>)>,
}

impl fmt::Display for FilterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|(column, values)| {
                if values.is_empty() {
                    format!("{} (non-empty)", column)
                } else {
                    format!("{} in [{}]", column, values.join(", "))
                }
            })
            .collect();
        write!(f, "{}: {}", self.policy, parts.join("; "))
    }
}

/// Whether `row` passes `spec` under `policy`. An empty spec passes everything.
pub fn matches(row: &NamedRow, spec: &FilterSpec, policy: MatchPolicy) -> bool {
    if spec.is_empty() {
        return true;
    }
    let mut results = spec.fields.iter().map(|field| field.matches(row));
    match policy {
        MatchPolicy::All => results.all(|m| m),
        MatchPolicy::Any => results.any(|m| m),
        MatchPolicy::None => !results.any(|m| m),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Header, Row};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn row(names: &[&str], values: Vec<Scalar>) -> NamedRow {
        let header = Arc::new(Header::from_names(names.iter().copied()));
        Row::Positional(values).resolve(&header, 2).unwrap()
    }

    fn spec(entries: &[(&str, Vec<FilterValue>)]) -> FilterSpec {
        let map: BTreeMap<String, Vec<FilterValue>> = entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        FilterSpec::compile(&map).unwrap()
    }

    fn lit(s: impl Into<Scalar>) -> FilterValue {
        FilterValue::Literal(s.into())
    }

    fn re(p: &str) -> FilterValue {
        FilterValue::Regex { regex: p.into() }
    }

    #[test]
    fn test_empty_spec_matches_under_every_policy() {
        let r = row(&["a"], vec!["x".into()]);
        let empty = FilterSpec::new();
        for policy in [MatchPolicy::All, MatchPolicy::Any, MatchPolicy::None] {
            assert!(matches(&r, &empty, policy));
        }
    }

    #[test]
    fn test_all_requires_every_field() {
        let r = row(&["status", "region"], vec!["shipped".into(), "EU".into()]);
        let both = spec(&[("status", vec![lit("shipped")]), ("region", vec![lit("EU")])]);
        let one = spec(&[("status", vec![lit("shipped")]), ("region", vec![lit("US")])]);
        assert!(matches(&r, &both, MatchPolicy::All));
        assert!(!matches(&r, &one, MatchPolicy::All));
        assert!(matches(&r, &one, MatchPolicy::Any));
        assert!(!matches(&r, &one, MatchPolicy::None));
    }

    #[test]
    fn test_none_rejects_any_match() {
        let r = row(&["status"], vec!["cancelled".into()]);
        let s = spec(&[("status", vec![lit("cancelled"), lit("void")])]);
        assert!(!matches(&r, &s, MatchPolicy::None));
        let r = row(&["status"], vec!["open".into()]);
        assert!(matches(&r, &s, MatchPolicy::None));
    }

    #[test]
    fn test_regex_matches_anywhere() {
        let r = row(&["sku"], vec!["AB-1234-X".into()]);
        assert!(matches(&r, &spec(&[("sku", vec![re(r"\d{4}")])]), MatchPolicy::All));
        assert!(!matches(&r, &spec(&[("sku", vec![re("^X")])]), MatchPolicy::All));
    }

    #[test]
    fn test_literal_coercion() {
        let r = row(&["qty", "paid"], vec!["10.0".into(), "TRUE".into()]);
        assert!(matches(&r, &spec(&[("qty", vec![lit(10i64)])]), MatchPolicy::All));
        assert!(matches(&r, &spec(&[("paid", vec![lit(true)])]), MatchPolicy::All));
        assert!(!matches(&r, &spec(&[("qty", vec![lit("10")])]), MatchPolicy::All));
        assert!(!matches(&r, &spec(&[("paid", vec![lit(false)])]), MatchPolicy::All));
    }

    #[test]
    fn test_absent_field_never_matches() {
        let r = row(&["a"], vec!["true".into()]);
        let s = spec(&[("status", vec![lit("true")])]);
        assert!(!matches(&r, &s, MatchPolicy::All));
        assert!(!matches(&r, &s, MatchPolicy::Any));
        assert!(matches(&r, &s, MatchPolicy::None));
        assert!(!matches(&r, &spec(&[("#5", vec![])]), MatchPolicy::All));
    }

    #[test]
    fn test_presence_test_without_values() {
        let s = spec(&[("#2", vec![])]);
        assert!(matches(&row(&["a", "b"], vec!["1".into(), "x".into()]), &s, MatchPolicy::All));
        assert!(!matches(&row(&["a", "b"], vec!["1".into(), " ".into()]), &s, MatchPolicy::All));
    }

    #[test]
    fn test_invalid_regex_is_config_error() {
        let map: BTreeMap<String, Vec<FilterValue>> =
            [("a".to_string(), vec![re("(unclosed")])].into_iter().collect();
        let err = FilterSpec::compile(&map).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRegex { .. }));
    }

    #[test]
    fn test_column_ref_parsing() {
        assert_eq!(ColumnRef::parse("#1").unwrap(), ColumnRef::Index(0));
        assert_eq!(ColumnRef::parse(" Country ").unwrap(), ColumnRef::Name("Country".into()));
        assert!(ColumnRef::parse("#0").is_err());
        assert!(ColumnRef::parse("").is_err());
    }

    #[test]
    fn test_filter_value_deserialization() {
        let values: Vec<FilterValue> =
            serde_json::from_str(r#"["EU", 3, true, null, {"regex": "^A"}]"#).unwrap();
        assert_eq!(values[0], lit("EU"));
        assert_eq!(values[1], lit(3i64));
        assert_eq!(values[2], lit(true));
        assert_eq!(values[3], FilterValue::Literal(Scalar::Null));
        assert_eq!(values[4], re("^A"));
    }

    #[test]
    fn test_snapshot_display() {
        let s = spec(&[("status", vec![lit("open"), re("^pend")]), ("#2", vec![])]);
        let text = s.snapshot(MatchPolicy::Any).to_string();
        assert!(text.starts_with("ANY:"));
        assert!(text.contains("status in [open, /^pend/]"));
        assert!(text.contains("#2 (non-empty)"));
    }
}
