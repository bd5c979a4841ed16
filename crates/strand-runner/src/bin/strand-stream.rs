//! # strand-stream
//!
//! Prints a strand market stream until Ctrl+C.
//!
//! ```bash
//! strand-stream wss://stream.strand.example/markets --sub markets:12:trades --detailed
//! ```

use std::process::ExitCode;

use clap::Parser;
use strand_core::logging::init_logging;
use strand_runner::shutdown::wait_for_interrupt;
use strand_runner::stream::{StreamCli, run_stream};
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = StreamCli::parse();
    init_logging(&cli.log_level, cli.log_dir.as_deref(), "strand-stream");

    match run_stream(&cli, wait_for_interrupt()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("strand-stream failed: {e:#}");
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
