//! Category resolution: the grouping key that routes a row to its output files.

use crate::filter::ColumnRef;
use crate::models::NamedRow;

/// Category used when no category fields are configured.
pub const DEFAULT_CATEGORY: &str = "default";

/// Stand-in for empty or missing category values.
pub const EMPTY_CATEGORY: &str = "EMPTY";

/// Derive the category of `row` from `fields`.
///
/// Values are joined with a single space, empty components becoming `EMPTY`.
/// When every component is empty the result is a single `EMPTY`.
pub fn resolve_category(row: &NamedRow, fields: &[ColumnRef]) -> String {
    if fields.is_empty() {
        return DEFAULT_CATEGORY.to_string();
    }

    let components: Vec<Option<String>> = fields
        .iter()
        .map(|field| {
            field
                .lookup(row)
                .filter(|value| !value.is_empty())
                .map(|value| value.to_text().trim().to_string())
        })
        .collect();

    if components.iter().all(Option::is_none) {
        return EMPTY_CATEGORY.to_string();
    }

    components
        .into_iter()
        .map(|c| c.unwrap_or_else(|| EMPTY_CATEGORY.to_string()))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Header, Row, Scalar};
    use std::sync::Arc;

    fn row(values: Vec<Scalar>) -> NamedRow {
        let header = Arc::new(Header::from_names(["country", "state", "qty"]));
        Row::Positional(values).resolve(&header, 2).unwrap()
    }

    fn fields(names: &[&str]) -> Vec<ColumnRef> {
        names.iter().map(|n| ColumnRef::parse(n).unwrap()).collect()
    }

    #[test]
    fn test_no_fields_is_default() {
        let r = row(vec!["USA".into(), "CA".into(), Scalar::Number(1.0)]);
        assert_eq!(resolve_category(&r, &[]), "default");
    }

    #[test]
    fn test_joins_components_with_space() {
        let r = row(vec!["USA".into(), "CA".into(), Scalar::Number(1.0)]);
        assert_eq!(resolve_category(&r, &fields(&["country", "state"])), "USA CA");
        assert_eq!(resolve_category(&r, &fields(&["#3"])), "1");
    }

    #[test]
    fn test_empty_components() {
        let r = row(vec!["USA".into(), "".into(), Scalar::Null]);
        assert_eq!(resolve_category(&r, &fields(&["country", "state"])), "USA EMPTY");
        assert_eq!(resolve_category(&r, &fields(&["state"])), "EMPTY");
        assert_eq!(resolve_category(&r, &fields(&["state", "qty"])), "EMPTY");
    }

    #[test]
    fn test_unknown_field_is_empty_not_error() {
        let r = row(vec!["USA".into(), "CA".into(), Scalar::Null]);
        assert_eq!(resolve_category(&r, &fields(&["nope"])), "EMPTY");
        assert_eq!(resolve_category(&r, &fields(&["country", "nope"])), "USA EMPTY");
    }

    #[test]
    fn test_deterministic() {
        let r = row(vec!["CAN".into(), "QC".into(), Scalar::Null]);
        let f = fields(&["country", "state"]);
        assert_eq!(resolve_category(&r, &f), resolve_category(&r.clone(), &f));
    }
}
