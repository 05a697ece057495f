//! Result Sink: turns the record buffer into files.
//!
//! Called once per run, at Finishing or on an abort path. Each requested
//! format is written independently; a failure in one is logged and does not
//! stop the others.

pub mod csv_table;
pub mod markdown;
pub mod workbook;

use crate::core::error::ExportError;
use crate::core::types::{ExportFormat, Mode, Record};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub trait ResultSink: Send + Sync {
    /// Write `records` in every supported format. Returns the files written.
    fn flush(
        &self,
        mode: Mode,
        records: &[Record],
        formats: &[ExportFormat],
    ) -> Result<Vec<PathBuf>, ExportError>;
}

/// `prefix-YYYY-MM-DD-HHhMM.ext`
pub fn export_filename(prefix: &str, ext: &str, at: DateTime<Local>) -> String {
    format!("{}-{}.{}", prefix, at.format("%Y-%m-%d-%Hh%M"), ext)
}

/// Avoid clobbering an export from the same minute: `name.ext` → `name-2.ext`, ...
fn unique_path(dir: &Path, file_name: &str) -> PathBuf {
    let first = dir.join(file_name);
    if !first.exists() {
        return first;
    }
    let (stem, ext) = file_name.rsplit_once('.').unwrap_or((file_name, ""));
    (2..)
        .map(|n| dir.join(format!("{}-{}.{}", stem, n, ext)))
        .find(|p| !p.exists())
        .unwrap_or(first)
}

/// Writes export files into one directory.
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write_one(
        &self,
        mode: Mode,
        records: &[&Record],
        format: ExportFormat,
        at: DateTime<Local>,
    ) -> Result<PathBuf, ExportError> {
        if !format.supports(mode) {
            return Err(ExportError::Unsupported { format, mode });
        }
        let path = unique_path(&self.dir, &export_filename(mode.label(), format.extension(), at));
        match format {
            ExportFormat::Xlsx => workbook::write(&path, mode, records)?,
            ExportFormat::Csv => csv_table::write(&path, mode, records)?,
            ExportFormat::Markdown => markdown::write(&path, mode, records, at)?,
        }
        Ok(path)
    }
}

impl ResultSink for FileSink {
    fn flush(
        &self,
        mode: Mode,
        records: &[Record],
        formats: &[ExportFormat],
    ) -> Result<Vec<PathBuf>, ExportError> {
        let records: Vec<&Record> = records.iter().filter(|r| r.mode() == mode).collect();
        std::fs::create_dir_all(&self.dir)?;
        let at = Local::now();

        let mut files = Vec::new();
        let mut last_err = None;
        for &format in formats {
            match self.write_one(mode, &records, format, at) {
                Ok(path) => {
                    info!("export: wrote {} {} records to {}", records.len(), mode, path.display());
                    files.push(path);
                }
                Err(e @ ExportError::Unsupported { .. }) => {
                    warn!("export: {}, skipping", e);
                }
                Err(e) => {
                    error!("export: {:?} failed: {}", format, e);
                    last_err = Some(e);
                }
            }
        }

        match (files.is_empty(), last_err) {
            (true, Some(e)) => Err(e),
            _ => Ok(files),
        }
    }
}
