use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ProcessingError, Result};
use crate::models::MergedRecord;
use crate::utils::constants::MERGED_FIELD_COUNT;

/// Write acknowledgment requirement for one insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsistencyLevel {
    Any,
    One,
    Two,
    Three,
    Quorum,
    All,
    LocalQuorum,
    EachQuorum,
    LocalOne,
}

impl Default for ConsistencyLevel {
    fn default() -> Self {
        ConsistencyLevel::Quorum
    }
}

impl fmt::Display for ConsistencyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConsistencyLevel::Any => "ANY",
            ConsistencyLevel::One => "ONE",
            ConsistencyLevel::Two => "TWO",
            ConsistencyLevel::Three => "THREE",
            ConsistencyLevel::Quorum => "QUORUM",
            ConsistencyLevel::All => "ALL",
            ConsistencyLevel::LocalQuorum => "LOCAL_QUORUM",
            ConsistencyLevel::EachQuorum => "EACH_QUORUM",
            ConsistencyLevel::LocalOne => "LOCAL_ONE",
        };
        f.write_str(name)
    }
}

impl FromStr for ConsistencyLevel {
    type Err = ProcessingError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "any" => Ok(ConsistencyLevel::Any),
            "one" => Ok(ConsistencyLevel::One),
            "two" => Ok(ConsistencyLevel::Two),
            "three" => Ok(ConsistencyLevel::Three),
            "quorum" => Ok(ConsistencyLevel::Quorum),
            "all" => Ok(ConsistencyLevel::All),
            "local_quorum" => Ok(ConsistencyLevel::LocalQuorum),
            "each_quorum" => Ok(ConsistencyLevel::EachQuorum),
            "local_one" => Ok(ConsistencyLevel::LocalOne),
            other => Err(ProcessingError::Config(format!(
                "Unknown consistency level: '{}'",
                other
            ))),
        }
    }
}

/// Parameterised insert with one positional placeholder per archive column.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub keyspace: String,
    pub table: String,
    pub columns: [&'static str; MERGED_FIELD_COUNT],
}

impl InsertStatement {
    pub const COLUMNS: [&'static str; MERGED_FIELD_COUNT] = [
        "wsid",
        "year",
        "month",
        "day",
        "hour",
        "temperature",
        "dewpoint",
        "pressure",
        "wind_direction",
        "wind_speed",
        "sky_condition",
        "one_hour_precip",
        "six_hour_precip",
    ];

    pub fn new(keyspace: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            columns: Self::COLUMNS,
        }
    }

    pub fn cql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(",");
        format!(
            "INSERT INTO {}.{} ({}) VALUES ({})",
            self.keyspace,
            self.table,
            self.columns.join(", "),
            placeholders
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ColumnValue {
    Text(String),
    Int(i32),
    Double(f64),
}

/// Station and hour: the upsert key of the weather table.
pub type PrimaryKey = (String, i32, i32, i32, i32);

/// The thirteen typed values bound to an `InsertStatement`.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundInsert {
    pub values: [ColumnValue; MERGED_FIELD_COUNT],
    pub observed_at: Option<NaiveDateTime>,
}

impl BoundInsert {
    pub fn from_record(record: &MergedRecord) -> Self {
        let o = &record.observation;
        Self {
            values: [
                ColumnValue::Text(record.station_id.to_string()),
                ColumnValue::Int(o.year),
                ColumnValue::Int(o.month as i32),
                ColumnValue::Int(o.day as i32),
                ColumnValue::Int(o.hour as i32),
                ColumnValue::Double(o.temperature.value()),
                ColumnValue::Double(o.dew_point.value()),
                ColumnValue::Double(o.pressure.value()),
                ColumnValue::Int(o.wind_direction.value()),
                ColumnValue::Double(o.wind_speed.value()),
                ColumnValue::Int(o.sky_condition.value()),
                ColumnValue::Double(o.precip_1h.value()),
                ColumnValue::Double(o.precip_6h.value()),
            ],
            observed_at: o.observed_at(),
        }
    }

    pub fn primary_key(&self) -> PrimaryKey {
        let int = |i: usize| match self.values[i] {
            ColumnValue::Int(v) => v,
            _ => 0,
        };
        let station = match &self.values[0] {
            ColumnValue::Text(s) => s.clone(),
            other => format!("{:?}", other),
        };
        (station, int(1), int(2), int(3), int(4))
    }

    /// Column name to value, in statement order
    pub fn to_json_row(&self, statement: &InsertStatement) -> Value {
        let mut row = Map::new();
        for (column, value) in statement.columns.iter().zip(self.values.iter()) {
            row.insert(
                column.to_string(),
                serde_json::to_value(value).unwrap_or(Value::Null),
            );
        }
        Value::Object(row)
    }
}

/// Write path of the column store.
///
/// `prepare` is called once per load and is where an unreachable store
/// reports `ResourceUnavailable`. `execute` resolves when the write has been
/// acknowledged at the requested consistency level.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn prepare(&self, statement: &InsertStatement) -> Result<()>;

    async fn execute(&self, insert: BoundInsert, consistency: ConsistencyLevel) -> Result<()>;

    async fn close(&self) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRow {
    pub insert: BoundInsert,
    pub consistency: ConsistencyLevel,
}

/// In-process table keyed by station and hour. Re-inserting a key replaces
/// the row, like an upsert in the real store.
pub struct MemorySink {
    rows: Mutex<HashMap<PrimaryKey, StoredRow>>,
    writes: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    reachable: bool,
    latency: Option<Duration>,
    fail_on_write: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            writes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
            reachable: true,
            latency: None,
            fail_on_write: None,
        }
    }

    /// A sink whose cluster cannot be contacted
    pub fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new()
        }
    }

    /// Delay every acknowledgment by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Reject the n-th write (1-based)
    pub fn with_failure_on_write(mut self, n: usize) -> Self {
        self.fail_on_write = Some(n);
        self
    }

    pub fn rows(&self) -> Vec<StoredRow> {
        self.lock_rows().values().cloned().collect()
    }

    pub fn row_count(&self) -> usize {
        self.lock_rows().len()
    }

    /// Writes received, including ones that replaced an existing key
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn lock_rows(&self) -> std::sync::MutexGuard<'_, HashMap<PrimaryKey, StoredRow>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn prepare(&self, statement: &InsertStatement) -> Result<()> {
        if !self.reachable {
            return Err(ProcessingError::ResourceUnavailable(format!(
                "no hosts available for {}.{}",
                statement.keyspace, statement.table
            )));
        }
        Ok(())
    }

    async fn execute(&self, insert: BoundInsert, consistency: ConsistencyLevel) -> Result<()> {
        let write_number = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_on_write == Some(write_number) {
            return Err(ProcessingError::Sink(format!(
                "write {} rejected by coordinator",
                write_number
            )));
        }

        let key = insert.primary_key();
        self.lock_rows().insert(key, StoredRow { insert, consistency });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Appends one JSON object per acknowledged insert to a file.
pub struct JsonLinesSink {
    path: PathBuf,
    statement: Mutex<Option<InsertStatement>>,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl JsonLinesSink {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            statement: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }
}

#[async_trait]
impl StorageSink for JsonLinesSink {
    async fn prepare(&self, statement: &InsertStatement) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                ProcessingError::ResourceUnavailable(format!("{}: {}", self.path.display(), e))
            })?;

        *self.writer.lock().unwrap_or_else(|p| p.into_inner()) = Some(BufWriter::new(file));
        *self.statement.lock().unwrap_or_else(|p| p.into_inner()) = Some(statement.clone());
        Ok(())
    }

    async fn execute(&self, insert: BoundInsert, consistency: ConsistencyLevel) -> Result<()> {
        let statement = self
            .statement
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| ProcessingError::Sink("statement not prepared".to_string()))?;

        let line = json!({
            "consistency": consistency,
            "observed_at": insert.observed_at,
            "keyspace": statement.keyspace,
            "table": statement.table,
            "row": insert.to_json_row(&statement),
        });

        let mut guard = self.writer.lock().unwrap_or_else(|p| p.into_inner());
        let writer = guard
            .as_mut()
            .ok_or_else(|| ProcessingError::Sink("sink is closed".to_string()))?;
        serde_json::to_writer(&mut *writer, &line)?;
        writer.write_all(b"\n")?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if let Some(mut writer) = self.writer.lock().unwrap_or_else(|p| p.into_inner()).take() {
            writer.flush()?;
        }
        Ok(())
    }
}
