//! Layered runtime settings.
//!
//! Built-in defaults, then an optional TOML file, then `ISD_LOADER_*`
//! environment variables. Command-line flags are applied on top by the
//! caller and the result is validated once more.

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;
use validator::{Validate, ValidationError};

use crate::error::Result;
use crate::loader::{ConsistencyLevel, InsertStatement, LoadOptions, ShapePolicy};
use crate::utils::constants::{
    DEFAULT_CHANNEL_CAPACITY, DEFAULT_FILE_PROGRESS_INTERVAL, DEFAULT_KEYSPACE,
    DEFAULT_MAX_IN_FLIGHT, DEFAULT_REPORT_INTERVAL, DEFAULT_SUBMIT_TIMEOUT_MS, DEFAULT_TABLE,
};

pub const ENV_PREFIX: &str = "ISD_LOADER";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Settings {
    #[validate(range(min = 1, max = 65536))]
    pub max_in_flight: usize,

    #[validate(range(min = 1))]
    pub submit_timeout_ms: u64,

    #[validate(range(min = 1))]
    pub report_interval: u64,

    #[validate(range(min = 1))]
    pub file_progress_interval: u64,

    #[validate(range(min = 1))]
    pub channel_capacity: usize,

    #[validate(custom(function = "validate_consistency"))]
    pub consistency: String,

    #[validate(custom(function = "validate_shape_policy"))]
    pub shape_policy: String,

    #[validate(length(min = 1))]
    pub keyspace: String,

    #[validate(length(min = 1))]
    pub table: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            submit_timeout_ms: DEFAULT_SUBMIT_TIMEOUT_MS,
            report_interval: DEFAULT_REPORT_INTERVAL,
            file_progress_interval: DEFAULT_FILE_PROGRESS_INTERVAL,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            consistency: "quorum".to_string(),
            shape_policy: "abort".to_string(),
            keyspace: DEFAULT_KEYSPACE.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl Settings {
    /// Defaults, then `config_file` (if any), then the process environment.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        Self::load_with_env(config_file, Environment::with_prefix(ENV_PREFIX).try_parsing(true))
    }

    pub fn load_with_env(config_file: Option<&Path>, environment: Environment) -> Result<Self> {
        let defaults = Settings::default();
        let mut builder = Config::builder()
            .set_default("max_in_flight", defaults.max_in_flight as u64)?
            .set_default("submit_timeout_ms", defaults.submit_timeout_ms)?
            .set_default("report_interval", defaults.report_interval)?
            .set_default("file_progress_interval", defaults.file_progress_interval)?
            .set_default("channel_capacity", defaults.channel_capacity as u64)?
            .set_default("consistency", defaults.consistency)?
            .set_default("shape_policy", defaults.shape_policy)?
            .set_default("keyspace", defaults.keyspace)?
            .set_default("table", defaults.table)?;

        if let Some(path) = config_file {
            debug!("Reading settings from {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let settings: Settings = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    pub fn consistency_level(&self) -> Result<ConsistencyLevel> {
        self.consistency.parse()
    }

    pub fn shape_policy(&self) -> Result<ShapePolicy> {
        self.shape_policy.parse()
    }

    pub fn statement(&self) -> InsertStatement {
        InsertStatement::new(self.keyspace.clone(), self.table.clone())
    }

    pub fn load_options(&self, silent: bool) -> Result<LoadOptions> {
        Ok(LoadOptions {
            max_in_flight: self.max_in_flight,
            submit_timeout: Duration::from_millis(self.submit_timeout_ms),
            report_interval: self.report_interval,
            channel_capacity: self.channel_capacity,
            shape_policy: self.shape_policy()?,
            silent,
        })
    }
}

fn validate_consistency(value: &str) -> std::result::Result<(), ValidationError> {
    value
        .parse::<ConsistencyLevel>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("unknown_consistency_level"))
}

fn validate_shape_policy(value: &str) -> std::result::Result<(), ValidationError> {
    value
        .parse::<ShapePolicy>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("unknown_shape_policy"))
}
