pub mod args;
pub mod commands;

pub use args::{Cli, Commands, SinkArgs, SinkKind};
pub use commands::{init_logging, run};
