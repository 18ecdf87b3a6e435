use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ProcessingError, Result};
use crate::models::{MergedRecord, StationId};
use crate::readers::{IsdLiteReader, LineOutcome};
use crate::utils::constants::DEFAULT_FILE_PROGRESS_INTERVAL;
use crate::utils::{station_id_from_path, ProgressReporter};

/// Outcome of merging one year directory into its archive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeReport {
    pub output_path: PathBuf,
    /// Input files processed, failed ones included; the archive itself is not counted
    pub files_attempted: usize,
    pub files_failed: usize,
    pub lines_written: u64,
    pub lines_skipped: u64,
    /// Console `.` markers printed, one per `progress_interval` files
    pub progress_markers: u64,
}

impl MergeReport {
    pub fn file_count(&self) -> usize {
        self.files_attempted
    }

    pub fn summary(&self) -> String {
        format!(
            "{}: {} files ({} failed), {} lines written, {} lines skipped",
            self.output_path.display(),
            self.files_attempted,
            self.files_failed,
            self.lines_written,
            self.lines_skipped
        )
    }
}

/// Merges per-station ISD-Lite files into one gzip CSV archive.
///
/// The archive is reopened in append mode for every input file and each
/// file becomes its own gzip member. A crash part way through a directory
/// therefore leaves every completed file readable in the archive.
pub struct StreamMerger {
    progress_interval: u64,
    silent: bool,
    cancel: Option<Arc<AtomicBool>>,
}

impl StreamMerger {
    pub fn new() -> Self {
        Self {
            progress_interval: DEFAULT_FILE_PROGRESS_INTERVAL,
            silent: true,
            cancel: None,
        }
    }

    pub fn with_progress_interval(mut self, progress_interval: u64) -> Self {
        self.progress_interval = progress_interval.max(1);
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    /// Checked before each input file; once set, `merge` returns `Cancelled`.
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Merge `input_files` into `output_path`.
    ///
    /// Per-file failures are logged and counted, never returned. With no
    /// usable input the archive is not created.
    pub fn merge(&self, input_files: &[PathBuf], output_path: &Path) -> Result<MergeReport> {
        let mut report = MergeReport {
            output_path: output_path.to_path_buf(),
            ..Default::default()
        };

        let progress = ProgressReporter::for_files(
            input_files.len() as u64,
            &format!("Merging into {}", output_path.display()),
            self.silent,
        );

        for input in input_files {
            if is_cancelled(self.cancel.as_ref()) {
                progress.finish_with_message("Cancelled");
                info!("Merge cancelled after {} files", report.files_attempted);
                return Err(ProcessingError::Cancelled);
            }

            if is_same_file(input, output_path) {
                debug!("Skipping output archive {}", input.display());
                continue;
            }

            report.files_attempted += 1;

            if let Err(e) = self.merge_file(input, output_path, &mut report) {
                report.files_failed += 1;
                warn!("Error while reading file {}: {}", input.display(), e);
                progress.println(&format!("Error while reading file: {}", input.display()));
            }

            progress.increment(1);
            if report.files_attempted as u64 % self.progress_interval == 0 {
                report.progress_markers += 1;
                progress.println(".");
                info!(
                    "{} files merged into {}",
                    report.files_attempted,
                    output_path.display()
                );
            }
        }

        progress.finish_with_message(&format!("Total files: {}", report.files_attempted));
        info!("{}", report.summary());

        Ok(report)
    }

    fn merge_file(&self, input: &Path, output: &Path, report: &mut MergeReport) -> Result<()> {
        let station_id = station_id_from_path(input)?;
        let reader = IsdLiteReader::open(input)?;

        let file = OpenOptions::new().create(true).append(true).open(output)?;
        let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

        let copied = copy_lines(reader, &station_id, &mut encoder, input, report);

        // Close the gzip member even after a read error so the lines already
        // written stay decodable.
        let finished = encoder.finish().and_then(|mut writer| writer.flush());

        copied?;
        finished?;
        Ok(())
    }
}

impl Default for StreamMerger {
    fn default() -> Self {
        Self::new()
    }
}

fn copy_lines<R: std::io::BufRead, W: Write>(
    reader: IsdLiteReader<R>,
    station_id: &StationId,
    writer: &mut W,
    input: &Path,
    report: &mut MergeReport,
) -> Result<()> {
    for outcome in reader {
        match outcome? {
            LineOutcome::Parsed(parsed) => {
                let record = MergedRecord::new(station_id.clone(), parsed.observation);
                writeln!(writer, "{}", record.to_csv_line())?;
                report.lines_written += 1;
            }
            LineOutcome::Rejected { line, error } => {
                report.lines_skipped += 1;
                warn!("Skipping {}:{}: {}", input.display(), line, error);
            }
        }
    }
    Ok(())
}

pub(crate) fn is_cancelled(cancel: Option<&Arc<AtomicBool>>) -> bool {
    cancel.is_some_and(|flag| flag.load(Ordering::SeqCst))
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readers::ArchiveReader;
    use std::fs::File;
    use tempfile::TempDir;

    const LINE: &str = "2005 01 01 00   123    45 10132   180    52     4     0 -9999";

    fn write_station_file(dir: &Path, name: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        for line in lines {
            writeln!(encoder, "{}", line).unwrap();
        }
        encoder.finish().unwrap();
        path
    }

    fn archive_lines(path: &Path) -> Vec<String> {
        ArchiveReader::open(path)
            .unwrap()
            .map(|l| l.unwrap().raw())
            .collect()
    }

    #[test]
    fn test_merge_writes_station_tagged_lines() {
        let dir = TempDir::new().unwrap();
        let input = write_station_file(dir.path(), "032040-99999.gz", &[LINE]);
        let output = dir.path().join("2005.csv.gz");

        let report = StreamMerger::new().merge(&[input], &output).unwrap();

        assert_eq!(report.file_count(), 1);
        assert_eq!(report.lines_written, 1);
        assert_eq!(
            archive_lines(&output),
            vec!["032040:99999,2005,01,01,00,12.3,4.5,1013.2,180,5.2,4,0.0,0"]
        );
    }

    #[test]
    fn test_merge_completeness() {
        let dir = TempDir::new().unwrap();
        let lines = [LINE; 4];
        let inputs: Vec<PathBuf> = (0..3)
            .map(|i| write_station_file(dir.path(), &format!("0000{}-99999.gz", i), &lines))
            .collect();
        let output = dir.path().join("2005.csv.gz");

        let report = StreamMerger::new().merge(&inputs, &output).unwrap();

        assert_eq!(report.lines_written, 12);
        assert_eq!(archive_lines(&output).len(), 12);
    }

    #[test]
    fn test_bad_lines_are_skipped_not_fatal() {
        let dir = TempDir::new().unwrap();
        let input = write_station_file(dir.path(), "032040-99999.gz", &[LINE, "garbage", LINE]);
        let output = dir.path().join("2005.csv.gz");

        let report = StreamMerger::new().merge(&[input], &output).unwrap();

        assert_eq!(report.files_failed, 0);
        assert_eq!(report.lines_written, 2);
        assert_eq!(report.lines_skipped, 1);
        assert_eq!(archive_lines(&output).len(), 2);
    }

    #[test]
    fn test_failed_files_do_not_abort_directory() {
        let dir = TempDir::new().unwrap();
        let bad_name = write_station_file(dir.path(), "stations.gz", &[LINE]);
        let not_gzip = dir.path().join("111111-22222.gz");
        fs::write(&not_gzip, LINE).unwrap();
        let good = write_station_file(dir.path(), "032040-99999.gz", &[LINE]);
        let output = dir.path().join("2005.csv.gz");

        let report = StreamMerger::new()
            .merge(&[bad_name, not_gzip, good], &output)
            .unwrap();

        assert_eq!(report.files_attempted, 3);
        assert_eq!(report.files_failed, 2);
        assert_eq!(archive_lines(&output).len(), 1);
    }

    #[test]
    fn test_output_archive_is_never_an_input() {
        let dir = TempDir::new().unwrap();
        let input = write_station_file(dir.path(), "032040-99999.gz", &[LINE]);
        let output = dir.path().join("2005.csv.gz");

        StreamMerger::new().merge(&[input.clone()], &output).unwrap();
        let report = StreamMerger::new()
            .merge(&[output.clone(), input], &output)
            .unwrap();

        assert_eq!(report.files_attempted, 1);
        assert_eq!(report.files_failed, 0);
        // second run appends the station file again, the archive is not re-read
        assert_eq!(archive_lines(&output).len(), 2);
    }

    #[test]
    fn test_empty_input_creates_no_archive() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("2005.csv.gz");

        let report = StreamMerger::new().merge(&[], &output).unwrap();

        assert_eq!(report, MergeReport {
            output_path: output.clone(),
            ..Default::default()
        });
        assert!(!output.exists());
    }

    #[test]
    fn test_unreadable_only_input_creates_no_archive() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("032040-99999.gz");
        let output = dir.path().join("2005.csv.gz");

        let report = StreamMerger::new().merge(&[missing], &output).unwrap();

        assert_eq!(report.files_failed, 1);
        assert!(!output.exists());
    }

    #[test]
    fn test_progress_marker_every_interval() {
        let dir = TempDir::new().unwrap();
        let inputs: Vec<PathBuf> = (0..5)
            .map(|i| write_station_file(dir.path(), &format!("0000{}-99999.gz", i), &[LINE]))
            .collect();
        let output = dir.path().join("2005.csv.gz");

        let report = StreamMerger::new()
            .with_progress_interval(2)
            .merge(&inputs, &output)
            .unwrap();

        assert_eq!(report.files_attempted, 5);
        assert_eq!(report.progress_markers, 2);
    }

    #[test]
    fn test_cancelled_merge_stops_before_next_file() {
        let dir = TempDir::new().unwrap();
        let input = write_station_file(dir.path(), "032040-99999.gz", &[LINE]);
        let output = dir.path().join("2005.csv.gz");
        let cancel = Arc::new(AtomicBool::new(true));

        let err = StreamMerger::new()
            .with_cancel_flag(cancel)
            .merge(&[input], &output)
            .unwrap_err();

        assert!(matches!(err, ProcessingError::Cancelled));
        assert!(!output.exists());
    }
}
