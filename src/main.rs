use anyhow::Context;
use clap::Parser;
use isd_loader::cli::{run, Cli};
use isd_loader::ProcessingError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cancel = Arc::new(AtomicBool::new(false));
    let command = run(cli, cancel.clone());

    tokio::select! {
        result = command => result.context("isd-loader failed")?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, stopping");
            // blocking stages see this at their next file and return, so the
            // runtime can shut down
            cancel.store(true, Ordering::SeqCst);
            return Err(ProcessingError::Cancelled.into());
        }
    }

    Ok(())
}
