use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Failure to decode one fixed-width ISD-Lite line.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("line is {length} characters long, at least {required} required")]
    ShortLine { length: usize, required: usize },

    #[error("field '{field}' is not numeric: '{value}'")]
    InvalidNumber { field: &'static str, value: String },

    #[error("field '{field}' does not fall on a character boundary")]
    NonAscii { field: &'static str },
}

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Cannot derive station id from file name: {}", path.display())]
    MalformedFileName { path: PathBuf },

    #[error("Record on line {line} has {found} fields, expected {expected}")]
    RecordShape {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Record on line {line} is invalid: {reason}")]
    InvalidRecord { line: u64, reason: String },

    #[error("Storage sink unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Submission not acknowledged within {timeout_ms} ms")]
    SubmissionTimeout { timeout_ms: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Processing cancelled by user")]
    Cancelled,

    #[error("Async task error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl From<config::ConfigError> for ProcessingError {
    fn from(error: config::ConfigError) -> Self {
        ProcessingError::Config(error.to_string())
    }
}

impl ProcessingError {
    /// Errors that only invalidate the record they were raised for.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            ProcessingError::RecordShape { .. } | ProcessingError::InvalidRecord { .. }
        )
    }
}
