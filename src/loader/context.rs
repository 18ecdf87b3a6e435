use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::Result;
use crate::loader::sink::{ConsistencyLevel, InsertStatement, StorageSink};
use crate::metrics::MetricsRecorder;
use crate::utils::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_MAX_IN_FLIGHT, DEFAULT_REPORT_INTERVAL,
    DEFAULT_SUBMIT_TIMEOUT_MS,
};

/// What to do with an archive line that does not decode into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShapePolicy {
    #[default]
    Abort,
    Skip,
}

impl std::str::FromStr for ShapePolicy {
    type Err = crate::error::ProcessingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(ShapePolicy::Abort),
            "skip" => Ok(ShapePolicy::Skip),
            other => Err(crate::error::ProcessingError::Config(format!(
                "Unknown shape policy: '{}' (expected abort or skip)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub max_in_flight: usize,
    pub submit_timeout: Duration,
    pub report_interval: u64,
    pub channel_capacity: usize,
    pub shape_policy: ShapePolicy,
    pub silent: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            submit_timeout: Duration::from_millis(DEFAULT_SUBMIT_TIMEOUT_MS),
            report_interval: DEFAULT_REPORT_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            shape_policy: ShapePolicy::Abort,
            silent: true,
        }
    }
}

/// Everything one load needs: the sink, its prepared statement, the
/// consistency level and the metrics for this run.
///
/// Built with [`LoadContext::open`], which prepares the statement, so an
/// unreachable store fails before any record is read.
pub struct LoadContext {
    sink: Arc<dyn StorageSink>,
    statement: InsertStatement,
    consistency: ConsistencyLevel,
    metrics: Arc<MetricsRecorder>,
    options: LoadOptions,
}

impl LoadContext {
    pub async fn open(
        sink: Arc<dyn StorageSink>,
        statement: InsertStatement,
        consistency: ConsistencyLevel,
        options: LoadOptions,
    ) -> Result<Self> {
        debug!("Preparing statement: {}", statement.cql());
        sink.prepare(&statement).await?;
        info!(
            "Prepared insert into {}.{} at consistency {}",
            statement.keyspace, statement.table, consistency
        );

        Ok(Self {
            sink,
            statement,
            consistency,
            metrics: Arc::new(MetricsRecorder::new()),
            options,
        })
    }

    pub fn sink(&self) -> &Arc<dyn StorageSink> {
        &self.sink
    }

    pub fn statement(&self) -> &InsertStatement {
        &self.statement
    }

    pub fn consistency(&self) -> ConsistencyLevel {
        self.consistency
    }

    pub fn metrics(&self) -> &Arc<MetricsRecorder> {
        &self.metrics
    }

    pub fn options(&self) -> &LoadOptions {
        &self.options
    }

    pub async fn close(&self) -> Result<()> {
        self.sink.close().await
    }
}
