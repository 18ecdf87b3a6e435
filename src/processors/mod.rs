pub mod directory_pipeline;
pub mod stream_merger;

pub use directory_pipeline::{list_station_files, list_subdirectories, DirectoryPipeline, PipelineReport};
pub use stream_merger::{MergeReport, StreamMerger};
