//! Tunemirror - keep a lower-quality mirror of a high-quality music library.
//!
//! Reads the primary library (FLAC and other lossless or high-bitrate
//! files), compares it with a mirror such as a portable player and copies,
//! encodes, updates or removes whatever differs.

mod commands;
mod logging;

use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use commands::{CliError, Command, GlobalArgs};
use logging::LoggingConfig;

/// Command-line arguments for tunemirror
#[derive(Parser, Debug)]
#[command(name = "tunemirror")]
#[command(about = "Keep a lower-quality mirror of a high-quality music library")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let logging = LoggingConfig::from_verbosity(cli.global.verbose)
        .with_file_logging(cli.global.log_file);
    let _guard = logging::init(&logging)?;
    info!("Starting tunemirror {}", env!("CARGO_PKG_VERSION"));

    let result = commands::run(&cli.command, &cli.global);
    if let Err(e) = &result {
        commands::log_failure(e);
    }
    result
}
