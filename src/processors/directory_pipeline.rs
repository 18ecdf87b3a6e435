use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ProcessingError, Result};
use crate::processors::stream_merger::is_cancelled;
use crate::processors::{MergeReport, StreamMerger};
use crate::utils::archive_path_for;
use crate::utils::constants::{DEFAULT_FILE_PROGRESS_INTERVAL, INPUT_EXTENSION};

#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub archives: Vec<MergeReport>,
}

impl PipelineReport {
    pub fn total_files(&self) -> usize {
        self.archives.iter().map(|a| a.files_attempted).sum()
    }

    pub fn total_failed_files(&self) -> usize {
        self.archives.iter().map(|a| a.files_failed).sum()
    }

    pub fn total_lines(&self) -> u64 {
        self.archives.iter().map(|a| a.lines_written).sum()
    }

    /// Archives that received at least one line
    pub fn written_archives(&self) -> impl Iterator<Item = &Path> {
        self.archives
            .iter()
            .filter(|a| a.lines_written > 0)
            .map(|a| a.output_path.as_path())
    }

    pub fn summary(&self) -> String {
        let mut lines = vec![format!(
            "Transform: {} directories, {} files ({} failed), {} lines",
            self.archives.len(),
            self.total_files(),
            self.total_failed_files(),
            self.total_lines()
        )];
        lines.extend(self.archives.iter().map(|a| format!("  {}", a.summary())));
        lines.join("\n")
    }
}

/// Walks `<data>/<year>/*.gz` and merges each year directory into one archive.
pub struct DirectoryPipeline {
    progress_interval: u64,
    silent: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl DirectoryPipeline {
    pub fn new() -> Self {
        Self {
            progress_interval: DEFAULT_FILE_PROGRESS_INTERVAL,
            silent: true,
            cancel: None,
        }
    }

    pub fn with_progress_interval(mut self, progress_interval: u64) -> Self {
        self.progress_interval = progress_interval;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Stop between files once `cancel` is set
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn run(&self, data_directory: &Path, output_directory: Option<&Path>) -> Result<PipelineReport> {
        if !data_directory.is_dir() {
            return Err(ProcessingError::InvalidInput(format!(
                "Path is not a directory: {}",
                data_directory.display()
            )));
        }

        if let Some(out) = output_directory {
            fs::create_dir_all(out)?;
        }

        let mut merger = StreamMerger::new()
            .with_progress_interval(self.progress_interval)
            .with_silent(self.silent);
        if let Some(cancel) = &self.cancel {
            merger = merger.with_cancel_flag(cancel.clone());
        }

        let mut report = PipelineReport::default();

        for year_dir in list_subdirectories(data_directory)? {
            if is_cancelled(self.cancel.as_ref()) {
                return Err(ProcessingError::Cancelled);
            }

            let files = match list_station_files(&year_dir) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Cannot list {}: {}", year_dir.display(), e);
                    continue;
                }
            };

            let output_path = match archive_path_for(&year_dir, output_directory) {
                Ok(path) => path,
                Err(e) => {
                    warn!("Skipping directory {}: {}", year_dir.display(), e);
                    continue;
                }
            };
            info!("From directory: {}", year_dir.display());
            info!("To file: {}", output_path.display());

            let merged = merger.merge(&files, &output_path)?;
            info!("Total files: {}", merged.file_count());
            report.archives.push(merged);
        }

        Ok(report)
    }
}

impl Default for DirectoryPipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Immediate subdirectories, sorted by path. Unreadable entries are logged and left out.
pub fn list_subdirectories(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs: Vec<PathBuf> = readable_entries(directory)?
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

/// Immediate `*.gz` files, sorted by path. Unreadable entries are logged and left out.
pub fn list_station_files(directory: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = readable_entries(directory)?
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == INPUT_EXTENSION))
        .collect();
    files.sort();
    Ok(files)
}

fn readable_entries(directory: &Path) -> Result<impl Iterator<Item = PathBuf>> {
    let directory_name = directory.display().to_string();
    Ok(fs::read_dir(directory)?.filter_map(move |entry| match entry {
        Ok(entry) => Some(entry.path()),
        Err(e) => {
            warn!("Unreadable entry in {}: {}", directory_name, e);
            None
        }
    }))
}
