//! JSON row arrays, the flattened form of a spreadsheet range.
//!
//! ```json
//! [["country", "qty"], ["USA", 3], ["CAN", 5]]
//! [{"country": "USA", "qty": 3}, {"country": "CAN", "qty": 5}]
//! ```

use serde_json::Value;
use std::path::Path;

use super::{RowResult, SourceRow};
use crate::error::SourceError;
use crate::models::{Row, Scalar};

/// Rows of a JSON array: arrays are positional, objects are keyed, bare
/// scalars are single-column rows.
pub struct JsonSource {
    rows: std::iter::Enumerate<std::vec::IntoIter<Value>>,
}

impl JsonSource {
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, SourceError> {
        let value: Value = serde_json::from_str(content)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, SourceError> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(SourceError::Json(serde::de::Error::custom(format!(
                    "expected an array of rows, found {}",
                    json_kind(&other)
                ))))
            }
        };
        Ok(Self {
            rows: items.into_iter().enumerate(),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Iterator for JsonSource {
    type Item = RowResult;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, item) = self.rows.next()?;
        let row = match item {
            Value::Array(values) => Row::Positional(values.iter().map(Scalar::from).collect()),
            Value::Object(map) => Row::Keyed(
                map.iter()
                    .map(|(k, v)| (k.clone(), Scalar::from(v)))
                    .collect(),
            ),
            scalar => Row::Positional(vec![Scalar::from(&scalar)]),
        };
        Some(Ok(SourceRow {
            line: index as u64 + 1,
            row,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_rows() {
        let rows: Vec<Row> = JsonSource::from_str(r#"[["a", "b"], ["x", 2]]"#)
            .unwrap()
            .map(|r| r.unwrap().row)
            .collect();
        assert_eq!(rows[1], Row::Positional(vec!["x".into(), Scalar::Number(2.0)]));
    }

    #[test]
    fn test_object_rows_are_keyed() {
        let mut source = JsonSource::from_str(r#"[{"country": "USA", "paid": true}]"#).unwrap();
        let row = source.next().unwrap().unwrap();
        assert_eq!(row.line, 1);
        match row.row {
            Row::Keyed(pairs) => {
                assert!(pairs.contains(&("paid".to_string(), Scalar::Bool(true))));
                assert_eq!(pairs.len(), 2);
            }
            other => panic!("expected keyed row, got {:?}", other),
        }
    }

    #[test]
    fn test_not_an_array() {
        let err = JsonSource::from_str(r#"{"a": 1}"#).err().unwrap();
        assert!(err.to_string().contains("array of rows"));
    }
}
