use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use validator::Validate;

use crate::cli::args::{Cli, Commands, SinkArgs, SinkKind};
use crate::config::Settings;
use crate::error::{ProcessingError, Result};
use crate::loader::{
    BulkLoader, JsonLinesSink, LoadContext, LoadSummary, MemorySink, QueuePublisher,
    StorageSink, TopicFileQueue,
};
use crate::metrics::MetricsRecorder;
use crate::processors::DirectoryPipeline;

pub fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("isd_loader={}", level)));

    let writer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_ansi(log_file.is_none())
                .with_writer(writer)
                .compact(),
        )
        .try_init()
        .map_err(|e| ProcessingError::Config(format!("Cannot initialise logging: {}", e)))
}

/// Execute one command. Blocking stages stop at the next file boundary once
/// `cancel` is set.
pub async fn run(cli: Cli, cancel: Arc<AtomicBool>) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Process {
            data_directory,
            output_directory,
        } => {
            println!("Processing station files...");
            println!("Data directory: {}", data_directory.display());

            let report = process(&settings, data_directory, output_directory, cancel).await?;
            println!("\n{}", report.summary());
            println!("Processing complete!");
        }

        Commands::Load {
            input_archive,
            sink,
        } => {
            let settings = with_overrides(settings, &sink)?;
            let target = SinkTarget::build(&sink)?;

            println!("Loading archive: {}", input_archive.display());
            let summary = load(&settings, &target, &input_archive).await?;
            println!("\n{}", summary.summary());
            println!("{}", target.describe());
        }

        Commands::Publish {
            input_archive,
            topic_file,
            skip_malformed,
        } => {
            let mut settings = settings;
            if skip_malformed {
                settings.shape_policy = "skip".to_string();
            }
            let publisher = QueuePublisher::new()
                .with_report_interval(settings.report_interval)
                .with_shape_policy(settings.shape_policy()?)
                .with_cancel_flag(cancel);

            println!("Publishing archive: {}", input_archive.display());
            println!("Topic file: {}", topic_file.display());

            let summary = tokio::task::spawn_blocking(move || {
                let queue = TopicFileQueue::open(&topic_file)?;
                publisher.publish_archive(&input_archive, &queue, &MetricsRecorder::new())
            })
            .await??;

            println!("\n{}", summary.summary());
        }

        Commands::Run {
            data_directory,
            output_directory,
            sink,
        } => {
            let settings = with_overrides(settings, &sink)?;
            let target = SinkTarget::build(&sink)?;

            let report = process(&settings, data_directory, output_directory, cancel).await?;
            println!("\n{}", report.summary());

            let archives: Vec<PathBuf> = report.written_archives().map(Path::to_path_buf).collect();
            let mut total_records = 0u64;
            let mut total_skipped = 0u64;

            for archive in &archives {
                println!("\nLoading archive: {}", archive.display());
                let summary = load(&settings, &target, archive).await?;
                println!("{}", summary.summary());
                total_records += summary.total_records;
                total_skipped += summary.skipped_records;
            }

            println!(
                "\nRun complete: {} archives, {} records loaded ({} skipped)",
                archives.len(),
                total_records,
                total_skipped
            );
            println!("{}", target.describe());
        }
    }

    Ok(())
}

async fn process(
    settings: &Settings,
    data_directory: PathBuf,
    output_directory: Option<PathBuf>,
    cancel: Arc<AtomicBool>,
) -> Result<crate::processors::PipelineReport> {
    let pipeline = DirectoryPipeline::new()
        .with_progress_interval(settings.file_progress_interval)
        .with_silent(false)
        .with_cancel_flag(cancel);

    tokio::task::spawn_blocking(move || pipeline.run(&data_directory, output_directory.as_deref()))
        .await?
}

async fn load(settings: &Settings, target: &SinkTarget, archive: &Path) -> Result<LoadSummary> {
    let context = LoadContext::open(
        target.storage(),
        settings.statement(),
        settings.consistency_level()?,
        settings.load_options(false)?,
    )
    .await?;

    info!("{}", context.statement().cql());
    BulkLoader::load(archive, &context).await
}

/// Command-line flags win over file and environment settings.
fn with_overrides(mut settings: Settings, args: &SinkArgs) -> Result<Settings> {
    if let Some(consistency) = &args.consistency {
        settings.consistency = consistency.clone();
    }
    if let Some(max_in_flight) = args.max_in_flight {
        settings.max_in_flight = max_in_flight;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        settings.submit_timeout_ms = timeout_ms;
    }
    if args.skip_malformed {
        settings.shape_policy = "skip".to_string();
    }
    settings.validate()?;
    Ok(settings)
}

enum SinkTarget {
    Memory(Arc<MemorySink>),
    Jsonl(Arc<JsonLinesSink>, PathBuf),
}

impl SinkTarget {
    fn build(args: &SinkArgs) -> Result<Self> {
        match args.sink {
            SinkKind::Memory => Ok(SinkTarget::Memory(Arc::new(MemorySink::new()))),
            SinkKind::Jsonl => {
                let path = args.output.clone().ok_or_else(|| {
                    ProcessingError::InvalidInput("--output is required with --sink jsonl".into())
                })?;
                Ok(SinkTarget::Jsonl(Arc::new(JsonLinesSink::new(&path)), path))
            }
        }
    }

    fn storage(&self) -> Arc<dyn StorageSink> {
        match self {
            SinkTarget::Memory(sink) => sink.clone(),
            SinkTarget::Jsonl(sink, _) => sink.clone(),
        }
    }

    fn describe(&self) -> String {
        match self {
            SinkTarget::Memory(sink) => format!(
                "Memory sink: {} rows from {} writes",
                sink.row_count(),
                sink.write_count()
            ),
            SinkTarget::Jsonl(_, path) => format!("Rows written to {}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::ShapePolicy;

    fn sink_args() -> SinkArgs {
        SinkArgs {
            sink: SinkKind::Memory,
            output: None,
            consistency: None,
            max_in_flight: None,
            timeout_ms: None,
            skip_malformed: false,
        }
    }

    #[test]
    fn test_flags_override_settings() {
        let args = SinkArgs {
            consistency: Some("all".to_string()),
            max_in_flight: Some(16),
            skip_malformed: true,
            ..sink_args()
        };
        let settings = with_overrides(Settings::default(), &args).unwrap();

        assert_eq!(settings.consistency, "all");
        assert_eq!(settings.max_in_flight, 16);
        assert_eq!(settings.shape_policy().unwrap(), ShapePolicy::Skip);
        assert_eq!(settings.submit_timeout_ms, 10_000);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = SinkArgs {
            max_in_flight: Some(0),
            ..sink_args()
        };
        assert!(matches!(
            with_overrides(Settings::default(), &args),
            Err(ProcessingError::Validation(_))
        ));
    }

    #[test]
    fn test_jsonl_sink_needs_output() {
        let args = SinkArgs {
            sink: SinkKind::Jsonl,
            ..sink_args()
        };
        assert!(matches!(
            SinkTarget::build(&args),
            Err(ProcessingError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_load_into_memory_target() {
        let dir = tempfile::TempDir::new().unwrap();
        let year = dir.path().join("2005");
        std::fs::create_dir(&year).unwrap();
        {
            use flate2::{write::GzEncoder, Compression};
            use std::io::Write;
            let file = std::fs::File::create(year.join("032040-99999.gz")).unwrap();
            let mut encoder = GzEncoder::new(file, Compression::default());
            writeln!(
                encoder,
                "2005 01 01 00   123    45 10132   180    52     4     0 -9999"
            )
            .unwrap();
            encoder.finish().unwrap();
        }

        let settings = Settings::default();
        let report = process(
            &settings,
            dir.path().to_path_buf(),
            None,
            Arc::new(AtomicBool::new(false)),
        )
        .await
        .unwrap();
        let archive = report.written_archives().next().unwrap().to_path_buf();

        let target = SinkTarget::build(&sink_args()).unwrap();
        let summary = load(&settings, &target, &archive).await.unwrap();

        assert_eq!(summary.total_records, 1);
        assert_eq!(target.describe(), "Memory sink: 1 rows from 1 writes");
    }
}
