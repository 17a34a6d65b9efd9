//! Output file router.
//!
//! Keeps one open, append-only file per category and rotates it when the next
//! row would push it past the size limit.
//!
//! ```text
//!  category "USA" ─▶ [sales USA 0001.csv (closed), sales USA 0002.csv (open)]
//!  category "CAN" ─▶ [sales CAN 0001.csv (open)]
//! ```
//!
//! The table itself ([`RouterState`]) belongs to the caller and is passed in
//! by `&mut`, so the router holds only settings and the name registry.

use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use super::naming::FileNamer;
use super::HeaderPlacement;
use crate::error::{OutputError, OutputResult};
use crate::filter::FilterSnapshot;

// =============================================================================
// Output files
// =============================================================================

/// Counters and identity of one output file.
#[derive(Debug, Clone, Serialize)]
pub struct FileMetrics {
    pub category: String,
    pub rotation: Option<u32>,
    pub file_name: String,
    pub path: PathBuf,
    pub bytes_written: u64,
    pub rows_written: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterSnapshot>,
}

/// An output file and, while it is open, its stream.
#[derive(Debug)]
pub struct OutputFile {
    metrics: FileMetrics,
    writer: Option<BufWriter<File>>,
}

impl OutputFile {
    pub fn metrics(&self) -> &FileMetrics {
        &self.metrics
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Append one serialized row and update the counters.
    pub async fn write_row(&mut self, bytes: &[u8]) -> OutputResult<()> {
        self.await_writable(bytes).await?;
        self.metrics.bytes_written += bytes.len() as u64;
        self.metrics.rows_written += 1;
        Ok(())
    }

    /// Single suspension point for every write: resolves once the stream has
    /// accepted all of `bytes`.
    async fn await_writable(&mut self, bytes: &[u8]) -> OutputResult<()> {
        let path = &self.metrics.path;
        let writer = self.writer.as_mut().ok_or_else(|| OutputError::Write {
            path: path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::BrokenPipe, "file already closed"),
        })?;
        writer
            .write_all(bytes)
            .await
            .map_err(|source| OutputError::Write {
                path: path.clone(),
                source,
            })
    }

    /// Flush and release the stream. Closing twice is a no-op.
    pub async fn close(&mut self) -> OutputResult<()> {
        if let Some(mut writer) = self.writer.take() {
            let close_err = |source| OutputError::Close {
                path: self.metrics.path.clone(),
                source,
            };
            writer.flush().await.map_err(close_err)?;
            writer.shutdown().await.map_err(close_err)?;
            debug!(
                file = %self.metrics.file_name,
                rows = self.metrics.rows_written,
                bytes = self.metrics.bytes_written,
                "Closed output file"
            );
        }
        Ok(())
    }
}

// =============================================================================
// Router state
// =============================================================================

/// Category → output files, oldest rotation first.
#[derive(Debug, Default)]
pub struct RouterState {
    lineages: HashMap<String, Vec<OutputFile>>,
    order: Vec<String>,
}

impl RouterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// All files, categories in first-seen order, rotations oldest first.
    pub fn files(&self) -> impl Iterator<Item = &OutputFile> {
        self.order
            .iter()
            .filter_map(|c| self.lineages.get(c))
            .flat_map(|files| files.iter())
    }

    /// Files of one category, oldest first.
    pub fn lineage(&self, category: &str) -> &[OutputFile] {
        self.lineages.get(category).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn categories(&self) -> &[String] {
        &self.order
    }

    pub fn file_count(&self) -> usize {
        self.lineages.values().map(Vec::len).sum()
    }

    pub fn open_count(&self) -> usize {
        self.files().filter(|f| f.is_open()).count()
    }

    /// Close every open stream, stopping at the first failure.
    pub async fn close_all(&mut self) -> OutputResult<()> {
        for files in self.lineages.values_mut() {
            for file in files.iter_mut().filter(|f| f.is_open()) {
                file.close().await?;
            }
        }
        Ok(())
    }

    /// Close every open stream, ignoring failures. Used on the failure path.
    pub async fn close_all_best_effort(&mut self) {
        for files in self.lineages.values_mut() {
            for file in files.iter_mut() {
                if let Err(e) = file.close().await {
                    debug!(error = %e, "Ignoring close failure while aborting");
                }
            }
        }
    }

    pub fn metrics(&self) -> Vec<FileMetrics> {
        self.files().map(|f| f.metrics.clone()).collect()
    }
}

// =============================================================================
// Router
// =============================================================================

/// Settings the router needs for opening and rotating files.
#[derive(Debug, Clone)]
pub struct RouterSettings {
    pub output_dir: PathBuf,
    /// Rotation threshold in bytes; `None` disables rotation.
    pub max_file_size: Option<u64>,
    pub header_placement: HeaderPlacement,
    /// Serialized header line, when the input has one.
    pub header_line: Option<Vec<u8>>,
    pub filter: Option<FilterSnapshot>,
}

/// Decides which file each row goes to.
#[derive(Debug)]
pub struct OutputRouter {
    settings: RouterSettings,
    namer: FileNamer,
}

impl OutputRouter {
    pub fn new(settings: RouterSettings, namer: FileNamer) -> Self {
        Self { settings, namer }
    }

    pub fn settings(&self) -> &RouterSettings {
        &self.settings
    }

    /// Return the file the next row of `category` (of `row_len` bytes) must be
    /// written to, opening or rotating as needed.
    pub async fn route<'s>(
        &mut self,
        state: &'s mut RouterState,
        category: &str,
        row_len: u64,
    ) -> OutputResult<&'s mut OutputFile> {
        let RouterState { lineages, order } = state;
        let lineage = lineages.entry(category.to_string()).or_default();

        let open_rotation = match lineage.last_mut() {
            None => Some(self.first_rotation()),
            Some(current) if self.should_rotate(&current.metrics, row_len) => {
                current.close().await?;
                debug!(
                    category,
                    rotation = ?current.metrics.rotation,
                    bytes = current.metrics.bytes_written,
                    "Rotating output file"
                );
                Some(current.metrics.rotation.map(|r| r + 1))
            }
            Some(_) => None,
        };

        if let Some(rotation) = open_rotation {
            let file = self.open(category, rotation).await?;
            // A category counts once its first file is open.
            if lineage.is_empty() {
                order.push(category.to_string());
            }
            lineage.push(file);
        }

        let last = lineage.len() - 1;
        Ok(&mut lineage[last])
    }

    fn first_rotation(&self) -> Option<u32> {
        self.settings.max_file_size.map(|_| 1)
    }

    /// A file with no rows yet always takes the next row, however large.
    fn should_rotate(&self, metrics: &FileMetrics, row_len: u64) -> bool {
        match self.settings.max_file_size {
            Some(max) => metrics.rows_written > 0 && metrics.bytes_written + row_len > max,
            None => false,
        }
    }

    async fn open(&mut self, category: &str, rotation: Option<u32>) -> OutputResult<OutputFile> {
        let file_name = self.namer.name_for(category, rotation);
        let path = self.settings.output_dir.join(&file_name);

        let handle = File::create(&path)
            .await
            .map_err(|source| OutputError::Open {
                path: path.clone(),
                source,
            })?;

        let mut file = OutputFile {
            metrics: FileMetrics {
                category: category.to_string(),
                rotation,
                file_name,
                path,
                bytes_written: 0,
                rows_written: 0,
                filter: self.settings.filter.clone(),
            },
            writer: Some(BufWriter::new(handle)),
        };

        if let Some(header) = &self.settings.header_line {
            match self.settings.header_placement {
                HeaderPlacement::PerFile => {
                    file.await_writable(header).await?;
                    file.metrics.bytes_written += header.len() as u64;
                }
                // Reserve room so the header still fits under the cap once prepended.
                HeaderPlacement::Backfill => {
                    file.metrics.bytes_written += header.len() as u64;
                }
                HeaderPlacement::Shared => {}
            }
        }

        debug!(file = %file.metrics.file_name, category, ?rotation, "Opened output file");
        Ok(file)
    }
}

// =============================================================================
// Header files
// =============================================================================

/// Write the shared header file and return its path.
pub async fn write_shared_header(dir: &Path, file_name: &str, header: &[u8]) -> OutputResult<PathBuf> {
    let path = dir.join(file_name);
    tokio::fs::write(&path, header)
        .await
        .map_err(|source| OutputError::Open {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Prepend `header` to every (closed) file. Reads and rewrites each file in full.
pub async fn backfill_headers(state: &RouterState, header: &[u8]) -> OutputResult<()> {
    for file in state.files() {
        let path = &file.metrics().path;
        let backfill_err = |source| OutputError::Backfill {
            path: path.clone(),
            source,
        };

        let body = tokio::fs::read(path).await.map_err(backfill_err)?;
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp = PathBuf::from(tmp_name);

        let mut content = Vec::with_capacity(header.len() + body.len());
        content.extend_from_slice(header);
        content.extend_from_slice(&body);

        tokio::fs::write(&tmp, &content).await.map_err(backfill_err)?;
        tokio::fs::rename(&tmp, path).await.map_err(backfill_err)?;
        debug!(file = %file.metrics().file_name, "Backfilled header");
    }
    Ok(())
}
