use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{ProcessingError, Result};
use crate::loader::context::ShapePolicy;
use crate::metrics::{MetricsRecorder, RateWindow};
use crate::readers::ArchiveReader;
use crate::utils::constants::{DEFAULT_REPORT_INTERVAL, PUBLISH_KEY_FIELDS};

/// Fire-and-forget message sink. `publish` returns once the message has been
/// handed over; there is no broker acknowledgment.
pub trait QueueSink: Send + Sync {
    fn publish(&self, key: String, line: String) -> Result<()>;

    fn close(&self) -> Result<()>;
}

/// In-process queue backed by an unbounded channel.
pub struct ChannelQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<(String, String)>>>,
}

impl ChannelQueue {
    pub fn unbounded() -> (Self, mpsc::UnboundedReceiver<(String, String)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }
}

impl QueueSink for ChannelQueue {
    fn publish(&self, key: String, line: String) -> Result<()> {
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        let tx = guard
            .as_ref()
            .ok_or_else(|| ProcessingError::Sink("queue is closed".to_string()))?;
        tx.send((key, line))
            .map_err(|_| ProcessingError::Sink("queue receiver dropped".to_string()))
    }

    fn close(&self) -> Result<()> {
        self.tx.lock().unwrap_or_else(|p| p.into_inner()).take();
        Ok(())
    }
}

/// Appends `key<TAB>line` records to a topic file.
pub struct TopicFileQueue {
    writer: Mutex<BufWriter<File>>,
}

impl TopicFileQueue {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| ProcessingError::ResourceUnavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl QueueSink for TopicFileQueue {
    fn publish(&self, key: String, line: String) -> Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(writer, "{}\t{}", key, line)?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.writer.lock().unwrap_or_else(|p| p.into_inner()).flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishSummary {
    pub published: u64,
    pub skipped: u64,
    pub one_minute_rate: f64,
    pub mean_rate: f64,
}

impl PublishSummary {
    pub fn summary(&self) -> String {
        format!(
            "Publish: {} messages ({} skipped), {:.1} msg/s mean, {:.1} msg/s (1 min)",
            self.published, self.skipped, self.mean_rate, self.one_minute_rate
        )
    }
}

/// Sends every archive line to a queue, keyed by station id and hour.
pub struct QueuePublisher {
    report_interval: u64,
    shape_policy: ShapePolicy,
    cancel: Option<Arc<AtomicBool>>,
}

impl QueuePublisher {
    pub fn new() -> Self {
        Self {
            report_interval: DEFAULT_REPORT_INTERVAL,
            shape_policy: ShapePolicy::Abort,
            cancel: None,
        }
    }

    pub fn with_report_interval(mut self, report_interval: u64) -> Self {
        self.report_interval = report_interval;
        self
    }

    pub fn with_shape_policy(mut self, shape_policy: ShapePolicy) -> Self {
        self.shape_policy = shape_policy;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn publish_archive(
        &self,
        archive_path: &Path,
        queue: &dyn QueueSink,
        metrics: &MetricsRecorder,
    ) -> Result<PublishSummary> {
        info!("Publishing archive: {}", archive_path.display());

        let mut published = 0u64;
        let mut skipped = 0u64;

        for item in ArchiveReader::open(archive_path)? {
            if self
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::SeqCst))
            {
                queue.close()?;
                return Err(ProcessingError::Cancelled);
            }

            let line = item?;
            if line.fields.len() < PUBLISH_KEY_FIELDS {
                let e = ProcessingError::RecordShape {
                    line: line.line,
                    expected: PUBLISH_KEY_FIELDS,
                    found: line.fields.len(),
                };
                match self.shape_policy {
                    ShapePolicy::Skip => {
                        warn!("Skipping message: {}", e);
                        skipped += 1;
                        continue;
                    }
                    ShapePolicy::Abort => return Err(e),
                }
            }

            let started = Instant::now();
            queue.publish(message_key(&line.fields), line.raw())?;
            metrics.record_duration(started.elapsed());
            published += 1;

            if self.report_interval > 0 && published % self.report_interval == 0 {
                info!(
                    "Line number: {}\tMsgs/s: {:.1}",
                    published,
                    metrics.rate(RateWindow::OneMinute)
                );
            }
        }

        queue.close()?;

        Ok(PublishSummary {
            published,
            skipped,
            one_minute_rate: metrics.rate(RateWindow::OneMinute),
            mean_rate: metrics.mean_rate(),
        })
    }
}

impl Default for QueuePublisher {
    fn default() -> Self {
        Self::new()
    }
}

/// Station id and calendar fields concatenated without separators
pub fn message_key(fields: &csv::StringRecord) -> String {
    fields.iter().take(PUBLISH_KEY_FIELDS).collect()
}
