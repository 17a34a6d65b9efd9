//! Domain models for the split pipeline.
//!
//! - [`Scalar`] - A single cell value (string, number, boolean or null)
//! - [`Header`] - Column names derived from the first row
//! - [`Row`] - A row as produced by an input source
//! - [`NamedRow`] - A row resolved against the header

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::RowError;

// =============================================================================
// Scalar
// =============================================================================

/// A single cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Scalar {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Scalar {
    /// Text form used for matching, categories and CSV output.
    pub fn to_text(&self) -> Cow<'_, str> {
        match self {
            Scalar::Null => Cow::Borrowed(""),
            Scalar::Bool(b) => Cow::Owned(b.to_string()),
            Scalar::Number(n) => Cow::Owned(format_number(*n)),
            Scalar::String(s) => Cow::Borrowed(s),
        }
    }

    /// Null, or a string holding only whitespace.
    pub fn is_empty(&self) -> bool {
        match self {
            Scalar::Null => true,
            Scalar::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view: numbers as-is, numeric strings parsed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Boolean view: booleans as-is, `"true"`/`"false"` strings parsed.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Scalar::Bool(b) => Some(*b),
            Scalar::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Parse a command-line literal: `true`/`false`, numbers, `null`, else text.
    ///
    /// Numbers must be written canonically, so `02134` or `1.50` stay text
    /// and keep matching only their exact spelling.
    pub fn parse_literal(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("null") {
            return Scalar::Null;
        }
        if let Some(b) = Scalar::String(trimmed.to_string()).as_bool() {
            return Scalar::Bool(b);
        }
        match trimmed.parse::<f64>() {
            Ok(n) if n.is_finite() && format_number(n) == trimmed => Scalar::Number(n),
            _ => Scalar::String(raw.to_string()),
        }
    }
}

/// Integers print without a fractional part.
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::String(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::String(s)
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<i64> for Scalar {
    fn from(n: i64) -> Self {
        Scalar::Number(n as f64)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<&serde_json::Value> for Scalar {
    fn from(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Scalar::Null,
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Number(n) => n.as_f64().map(Scalar::Number).unwrap_or(Scalar::Null),
            Value::String(s) => Scalar::String(s.clone()),
            nested => Scalar::String(nested.to_string()),
        }
    }
}

// =============================================================================
// Header
// =============================================================================

/// Column names, in source order, with a name lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl Header {
    /// Build a header from a header row.
    ///
    /// Blank names become `Column N` (1-based); repeated names get an
    /// occurrence count appended (`Name`, `Name 2`, ...).
    pub fn from_values(values: &[Scalar]) -> Self {
        Self::from_names(values.iter().map(|v| v.to_text().trim().to_string()))
    }

    /// Build a header from raw names, applying the same rules as [`Header::from_values`].
    pub fn from_names<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut seen: HashMap<String, usize> = HashMap::new();

        for (position, name) in raw.into_iter().enumerate() {
            let mut name: String = name.into();
            if name.trim().is_empty() {
                name = format!("Column {}", position + 1);
            }

            let mut unique = name.clone();
            if index.contains_key(&unique) {
                let count = seen.entry(name.clone()).or_insert(1);
                loop {
                    *count += 1;
                    unique = format!("{} {}", name, count);
                    if !index.contains_key(&unique) {
                        break;
                    }
                }
            }
            seen.entry(name).or_insert(1);

            index.insert(unique.clone(), names.len());
            names.push(unique);
        }

        Self { names, index }
    }

    /// `Column 1` .. `Column width`, for inputs without a header row.
    pub fn synthesized(width: usize) -> Self {
        Self::from_names((1..=width).map(|i| format!("Column {}", i)))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a column by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }
}

// =============================================================================
// Rows
// =============================================================================

/// A row as produced by an input source.
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    /// Values aligned to the header by position.
    Positional(Vec<Scalar>),
    /// Values keyed by column name.
    Keyed(Vec<(String, Scalar)>),
}

impl Row {
    /// Resolve against the header.
    ///
    /// Positional rows must match the header width. Keyed rows take their
    /// values by name and must not carry a key the header lacks; missing keys
    /// become null.
    pub fn resolve(self, header: &Arc<Header>, line: u64) -> Result<NamedRow, RowError> {
        let values = match self {
            Row::Positional(values) => {
                if values.len() != header.len() {
                    return Err(RowError::ColumnCount {
                        line,
                        expected: header.len(),
                        found: values.len(),
                    });
                }
                values
            }
            Row::Keyed(pairs) => {
                let mut values = vec![Scalar::Null; header.len()];
                for (key, value) in pairs {
                    match header.position(&key) {
                        Some(position) => values[position] = value,
                        None => return Err(RowError::UnknownColumn { line, column: key }),
                    }
                }
                values
            }
        };

        Ok(NamedRow {
            header: Arc::clone(header),
            values,
        })
    }
}

/// A row whose values line up with a [`Header`].
#[derive(Debug, Clone, PartialEq)]
pub struct NamedRow {
    header: Arc<Header>,
    values: Vec<Scalar>,
}

impl NamedRow {
    /// Value of a named column.
    pub fn get(&self, name: &str) -> Option<&Scalar> {
        self.header.position(name).and_then(|i| self.values.get(i))
    }

    /// Value at a 0-based position.
    pub fn get_index(&self, index: usize) -> Option<&Scalar> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Scalar] {
        &self.values
    }
}
