//! Output side of a run: file naming and the per-category file router.

pub mod naming;
pub mod router;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use naming::{build_file_name, header_file_name, sanitize_file_name, FileNamer};
pub use router::{
    backfill_headers, write_shared_header, FileMetrics, OutputFile, OutputRouter, RouterSettings,
    RouterState,
};

/// Where the header line goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeaderPlacement {
    /// One `{base} HEADER.csv` file; data files hold rows only.
    Shared,
    /// Header written at the top of every file when it is opened.
    #[default]
    PerFile,
    /// Header prepended to every file after the run. Rewrites each file.
    Backfill,
}

impl FromStr for HeaderPlacement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "shared" => Ok(HeaderPlacement::Shared),
            "per_file" => Ok(HeaderPlacement::PerFile),
            "backfill" => Ok(HeaderPlacement::Backfill),
            other => Err(format!(
                "unknown header placement '{}' (shared, per-file, backfill)",
                other
            )),
        }
    }
}

impl fmt::Display for HeaderPlacement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HeaderPlacement::Shared => "shared",
            HeaderPlacement::PerFile => "per-file",
            HeaderPlacement::Backfill => "backfill",
        };
        f.write_str(s)
    }
}
