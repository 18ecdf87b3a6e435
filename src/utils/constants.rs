/// ISD-Lite "no reading" marker, compared against the trimmed raw field text
pub const MISSING_SENTINEL: &str = "-9999";

/// Shortest fixed-width line that covers every field range
pub const MIN_LINE_LENGTH: usize = 61;

/// Station id followed by the twelve observation fields
pub const MERGED_FIELD_COUNT: usize = 13;

/// Fields that make up a queue message key (station id plus calendar fields)
pub const PUBLISH_KEY_FIELDS: usize = 5;

/// File names
pub const INPUT_EXTENSION: &str = "gz";
pub const ARCHIVE_SUFFIX: &str = ".csv.gz";

/// Processing defaults
pub const DEFAULT_MAX_IN_FLIGHT: usize = 1024;
pub const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_REPORT_INTERVAL: u64 = 1000;
pub const DEFAULT_FILE_PROGRESS_INTERVAL: u64 = 100;
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4096;
pub const DEFAULT_BUFFER_SIZE: usize = 8192 * 16; // 128KB

/// Storage schema defaults
pub const DEFAULT_KEYSPACE: &str = "isd_weather_data";
pub const DEFAULT_TABLE: &str = "raw_weather_data";

/// Metrics
pub const RESERVOIR_SIZE: usize = 1028;
pub const EWMA_TICK_SECONDS: u64 = 5;
