use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "isd-loader")]
#[command(about = "Merge ISD-Lite station files into yearly archives and bulk-load them")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,

    #[arg(long, global = true, help = "Settings file (TOML)")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge every <DATA_DIRECTORY>/<year>/*.gz into <year>.csv.gz
    Process {
        #[arg(help = "Directory containing one subdirectory per year")]
        data_directory: PathBuf,

        #[arg(help = "Directory for the archives [default: each year directory]")]
        output_directory: Option<PathBuf>,
    },

    /// Insert every record of a merged archive into the weather table
    Load {
        #[arg(short, long, help = "Merged archive (.csv.gz)")]
        input_archive: PathBuf,

        #[command(flatten)]
        sink: SinkArgs,
    },

    /// Send every line of a merged archive to a message topic
    Publish {
        #[arg(short, long, help = "Merged archive (.csv.gz)")]
        input_archive: PathBuf,

        #[arg(short, long, help = "Topic file receiving key<TAB>line records")]
        topic_file: PathBuf,

        #[arg(long, help = "Skip lines with too few fields instead of failing")]
        skip_malformed: bool,
    },

    /// Process a data directory, then load every archive it produced
    Run {
        data_directory: PathBuf,

        output_directory: Option<PathBuf>,

        #[command(flatten)]
        sink: SinkArgs,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SinkKind {
    /// Keep rows in memory and report the count
    Memory,
    /// Append one JSON object per row to --output
    Jsonl,
}

#[derive(Args, Debug, Clone)]
pub struct SinkArgs {
    #[arg(long, value_enum, default_value = "memory")]
    pub sink: SinkKind,

    #[arg(short, long, help = "Output file for the jsonl sink")]
    pub output: Option<PathBuf>,

    #[arg(long, help = "Write consistency level [default: quorum]")]
    pub consistency: Option<String>,

    #[arg(long, help = "Maximum unacknowledged inserts [default: 1024]")]
    pub max_in_flight: Option<usize>,

    #[arg(long, help = "Per-insert deadline in milliseconds [default: 10000]")]
    pub timeout_ms: Option<u64>,

    #[arg(long, help = "Skip malformed archive lines instead of failing")]
    pub skip_malformed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_load_flags() {
        let cli = Cli::try_parse_from([
            "isd-loader",
            "load",
            "--input-archive",
            "2005.csv.gz",
            "--sink",
            "jsonl",
            "--output",
            "rows.jsonl",
            "--consistency",
            "one",
            "--max-in-flight",
            "8",
            "--skip-malformed",
        ])
        .unwrap();

        match cli.command {
            Commands::Load { input_archive, sink } => {
                assert_eq!(input_archive, PathBuf::from("2005.csv.gz"));
                assert_eq!(sink.sink, SinkKind::Jsonl);
                assert_eq!(sink.consistency.as_deref(), Some("one"));
                assert_eq!(sink.max_in_flight, Some(8));
                assert!(sink.skip_malformed);
            }
            _ => panic!("expected load"),
        }
    }

    #[test]
    fn test_process_requires_data_directory() {
        assert!(Cli::try_parse_from(["isd-loader", "process"]).is_err());

        let cli = Cli::try_parse_from(["isd-loader", "-v", "process", "data", "out"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Process {
                data_directory,
                output_directory,
            } => {
                assert_eq!(data_directory, PathBuf::from("data"));
                assert_eq!(output_directory, Some(PathBuf::from("out")));
            }
            _ => panic!("expected process"),
        }
    }
}
