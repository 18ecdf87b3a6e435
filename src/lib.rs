pub mod cli;
pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod models;
pub mod processors;
pub mod readers;
pub mod utils;

pub use error::{ProcessingError, Result};
