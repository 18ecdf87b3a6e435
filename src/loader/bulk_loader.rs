use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{ProcessingError, Result};
use crate::loader::context::{LoadContext, ShapePolicy};
use crate::loader::sink::BoundInsert;
use crate::metrics::RateWindow;
use crate::readers::{ArchiveLine, ArchiveReader};
use crate::utils::ProgressReporter;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadSummary {
    pub total_records: u64,
    pub skipped_records: u64,
    pub one_minute_rate: f64,
    pub five_minute_rate: f64,
    pub fifteen_minute_rate: f64,
    pub mean_throughput: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub elapsed: Duration,
}

impl LoadSummary {
    pub fn summary(&self) -> String {
        format!(
            "Load: {} records ({} skipped) in {:.2}s\n\
             Throughput: {:.1} ops/s mean, {:.1} / {:.1} / {:.1} ops/s (1/5/15 min)\n\
             Insert latency: p95 {:.3} ms, p99 {:.3} ms",
            self.total_records,
            self.skipped_records,
            self.elapsed.as_secs_f64(),
            self.mean_throughput,
            self.one_minute_rate,
            self.five_minute_rate,
            self.fifteen_minute_rate,
            self.p95_latency_ms,
            self.p99_latency_ms
        )
    }
}

/// Streams a merged archive into a `StorageSink`.
///
/// A blocking task decompresses and splits lines into a bounded channel.
/// Records are submitted without waiting for earlier acknowledgments, up to
/// `max_in_flight` at a time. The first failed or timed-out submission stops
/// the run: nothing new is issued, in-flight work is drained and the error is
/// returned.
pub struct BulkLoader;

impl BulkLoader {
    pub async fn load(archive_path: &Path, context: &LoadContext) -> Result<LoadSummary> {
        let started = Instant::now();
        let options = context.options().clone();
        info!("Loading archive: {}", archive_path.display());

        let (tx, mut rx) = mpsc::channel(options.channel_capacity.max(1));
        let reader = spawn_reader(archive_path.to_path_buf(), tx);

        let semaphore = Arc::new(Semaphore::new(options.max_in_flight.max(1)));
        let mut submissions: JoinSet<Result<()>> = JoinSet::new();
        let progress = ProgressReporter::for_records("Loading records", options.silent);

        let mut submitted: u64 = 0;
        let mut skipped: u64 = 0;
        let mut failure: Option<ProcessingError> = None;

        while let Some(item) = rx.recv().await {
            let record = match item.and_then(|line| line.decode()) {
                Ok(record) => record,
                Err(e) if e.is_record_level() && options.shape_policy == ShapePolicy::Skip => {
                    warn!("Skipping record: {}", e);
                    skipped += 1;
                    continue;
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            };

            if let Some(e) = reap_finished(&mut submissions) {
                failure = Some(e);
                break;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    failure = Some(ProcessingError::Cancelled);
                    break;
                }
            };

            // a submission may have failed while we waited for the permit
            if let Some(e) = reap_finished(&mut submissions) {
                drop(permit);
                failure = Some(e);
                break;
            }

            let sink = context.sink().clone();
            let metrics = context.metrics().clone();
            let consistency = context.consistency();
            let deadline = options.submit_timeout;
            let insert = BoundInsert::from_record(&record);

            submissions.spawn(async move {
                let _permit = permit;
                let issued = Instant::now();
                match tokio::time::timeout(deadline, sink.execute(insert, consistency)).await {
                    Ok(Ok(())) => {
                        metrics.record_duration(issued.elapsed());
                        Ok(())
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ProcessingError::SubmissionTimeout {
                        timeout_ms: u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
                    }),
                }
            });

            submitted += 1;
            progress.increment(1);
            if options.report_interval > 0 && submitted % options.report_interval == 0 {
                let line = context.metrics().snapshot().progress_line();
                info!("{}", line);
                progress.set_message(&line);
            }
        }

        // stops the reader if we broke out early
        drop(rx);

        debug!("Draining {} pending submissions", submissions.len());
        while let Some(joined) = submissions.join_next().await {
            if let Err(e) = flatten(joined) {
                if failure.is_none() {
                    failure = Some(e);
                }
            }
        }

        if let Err(e) = reader.await {
            if failure.is_none() {
                failure = Some(ProcessingError::TaskJoin(e));
            }
        }

        let closed = context.close().await;

        if let Some(e) = failure {
            error!("Load failed after {} submissions: {}", submitted, e);
            progress.finish_with_message("Load failed");
            return Err(e);
        }
        closed?;

        let metrics = context.metrics();
        let snapshot = metrics.snapshot();
        let summary = LoadSummary {
            total_records: submitted,
            skipped_records: skipped,
            one_minute_rate: metrics.rate(RateWindow::OneMinute),
            five_minute_rate: metrics.rate(RateWindow::FiveMinutes),
            fifteen_minute_rate: metrics.rate(RateWindow::FifteenMinutes),
            mean_throughput: snapshot.mean_rate,
            p95_latency_ms: snapshot.p95_ms,
            p99_latency_ms: snapshot.p99_ms,
            elapsed: started.elapsed(),
        };

        info!("{}", snapshot.progress_line());
        progress.finish_with_message(&format!("Loaded {} records", submitted));
        Ok(summary)
    }
}

fn spawn_reader(
    path: PathBuf,
    tx: mpsc::Sender<Result<ArchiveLine>>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let reader = match ArchiveReader::open(&path) {
            Ok(reader) => reader,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        };
        for item in reader {
            let fatal = matches!(&item, Err(e) if !e.is_record_level());
            if tx.blocking_send(item).is_err() || fatal {
                break;
            }
        }
    })
}

fn flatten(joined: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    joined?
}

/// Collects already-finished submissions without waiting; returns the first error.
fn reap_finished(submissions: &mut JoinSet<Result<()>>) -> Option<ProcessingError> {
    while let Some(joined) = submissions.try_join_next() {
        if let Err(e) = flatten(joined) {
            return Some(e);
        }
    }
    None
}
