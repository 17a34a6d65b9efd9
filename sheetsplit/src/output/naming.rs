//! Output file names.
//!
//! `{base}[ {category}][ FILTERED][ {rotation:04}].csv`, sanitized for the file
//! system. [`FileNamer`] keeps names unique within a run.

use std::collections::{HashMap, HashSet};

use crate::category::DEFAULT_CATEGORY;

/// Zero-padded width of rotation numbers.
pub const ROTATION_WIDTH: usize = 4;

const EXTENSION: &str = "csv";

/// Sanitized file name for one output file.
pub fn build_file_name(base: &str, category: &str, rotation: Option<u32>, filtered: bool) -> String {
    let mut stem = base.to_string();
    if category != DEFAULT_CATEGORY {
        stem.push(' ');
        stem.push_str(category);
    }
    if filtered {
        stem.push_str(" FILTERED");
    }
    if let Some(n) = rotation {
        stem.push_str(&format!(" {:0width$}", n, width = ROTATION_WIDTH));
    }
    format!("{}.{}", sanitize_file_name(&stem), EXTENSION)
}

/// Name of the shared header file.
pub fn header_file_name(base: &str) -> String {
    format!("{}.{}", sanitize_file_name(&format!("{} HEADER", base)), EXTENSION)
}

/// Replace characters that are unsafe in file names with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if trimmed.is_empty() {
        "_".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Hands out one name per (category, rotation) and never the same name twice.
///
/// Uniqueness is checked case-insensitively so two categories differing only
/// by case cannot overwrite each other on case-insensitive file systems.
#[derive(Debug, Default)]
pub struct FileNamer {
    base: String,
    filtered: bool,
    assigned: HashMap<(String, Option<u32>), String>,
    taken: HashSet<String>,
}

impl FileNamer {
    pub fn new(base: impl Into<String>, filtered: bool) -> Self {
        Self {
            base: base.into(),
            filtered,
            ..Self::default()
        }
    }

    /// Claim a name outside the (category, rotation) scheme, e.g. the header file.
    pub fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_lowercase());
    }

    /// Name for `(category, rotation)`; stable for the lifetime of the namer.
    pub fn name_for(&mut self, category: &str, rotation: Option<u32>) -> String {
        let key = (category.to_string(), rotation);
        if let Some(name) = self.assigned.get(&key) {
            return name.clone();
        }

        let candidate = build_file_name(&self.base, category, rotation, self.filtered);
        let mut name = candidate.clone();
        let mut n = 1;
        while self.taken.contains(&name.to_lowercase()) {
            n += 1;
            let stem = candidate.trim_end_matches(&format!(".{}", EXTENSION));
            name = format!("{} ~{}.{}", stem, n, EXTENSION);
        }

        self.taken.insert(name.to_lowercase());
        self.assigned.insert(key, name.clone());
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_category_is_omitted() {
        assert_eq!(build_file_name("sales", "default", None, false), "sales.csv");
    }

    #[test]
    fn test_full_name() {
        assert_eq!(
            build_file_name("sales", "USA", Some(3), true),
            "sales USA FILTERED 0003.csv"
        );
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(
            build_file_name("report", "A/B: C?", None, false),
            "report A_B_ C_.csv"
        );
        assert_eq!(sanitize_file_name("..tab\there.."), "tab_here");
        assert_eq!(sanitize_file_name("..."), "_");
    }

    #[test]
    fn test_header_file_name() {
        assert_eq!(header_file_name("sales"), "sales HEADER.csv");
    }

    #[test]
    fn test_namer_is_stable() {
        let mut namer = FileNamer::new("sales", false);
        let a = namer.name_for("USA", Some(1));
        assert_eq!(namer.name_for("USA", Some(1)), a);
    }

    #[test]
    fn test_namer_is_injective_after_sanitizing() {
        let mut namer = FileNamer::new("sales", false);
        let slash = namer.name_for("A/B", None);
        let underscore = namer.name_for("A_B", None);
        let upper = namer.name_for("a_b", None);
        assert_eq!(slash, "sales A_B.csv");
        assert_eq!(underscore, "sales A_B ~2.csv");
        assert_eq!(upper, "sales a_b ~3.csv");
    }

    #[test]
    fn test_reserved_names_are_skipped() {
        let mut namer = FileNamer::new("sales", false);
        namer.reserve(&header_file_name("sales"));
        assert_eq!(namer.name_for("HEADER", None), "sales HEADER ~2.csv");
    }

    #[test]
    fn test_rotation_names_differ() {
        let mut namer = FileNamer::new("x", true);
        let names: HashSet<String> = (1..=20).map(|r| namer.name_for("EU", Some(r))).collect();
        assert_eq!(names.len(), 20);
    }
}
