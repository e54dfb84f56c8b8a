//! Subcommands of the `tunemirror` binary.
//!
//! - `sync`: mirror the library into a destination
//! - `stats`: library statistics and tree listing
//! - `config`: show or initialize the configuration file

mod config;
mod error;
mod stats;
mod sync;

use std::path::{Path, PathBuf};

use clap::{ArgAction, Args, Subcommand};
use tunemirror_core::MirrorConfig;

pub use config::ConfigArgs;
pub use error::{CliError, log_failure};
pub use stats::StatsArgs;
pub use sync::SyncArgs;

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Synchronize the library into a lower-quality mirror
    Sync(SyncArgs),
    /// Show library statistics
    Stats(StatsArgs),
    /// Show or initialize the configuration file
    Config(ConfigArgs),
}

/// Options shared by every command. They override the configuration file.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Path to the primary, high-quality library
    #[arg(short = 'L', long, global = true, env = "TUNEMIRROR_LIBRARY")]
    pub library: Option<PathBuf>,

    /// Show more information (repeat for debug output)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Configuration file to use instead of the default one
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Also write JSON logs to the log directory
    #[arg(long, global = true)]
    pub log_file: bool,

    /// Ignore hidden files and directories
    #[arg(long, global = true, value_name = "BOOL")]
    pub ignore_hidden: Option<bool>,

    /// Follow symbolic links
    #[arg(long, global = true, value_name = "BOOL")]
    pub follow_symlinks: Option<bool>,
}

impl GlobalArgs {
    /// Load the configuration file and apply command-line overrides.
    pub fn load_config(&self) -> Result<MirrorConfig, CliError> {
        let mut config = match &self.config {
            Some(path) => MirrorConfig::load_from(path)?,
            None => MirrorConfig::load()?,
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut MirrorConfig) {
        if let Some(library) = &self.library {
            config.library_path = Some(library.clone());
        }
        if let Some(ignore_hidden) = self.ignore_hidden {
            config.ignore_hidden = ignore_hidden;
        }
        if let Some(follow_symlinks) = self.follow_symlinks {
            config.follow_symlinks = follow_symlinks;
        }
        config.verbose |= self.verbose > 0;
    }
}

/// Run a command.
pub fn run(command: &Command, global: &GlobalArgs) -> Result<(), CliError> {
    match command {
        Command::Sync(args) => sync::run(args, global.load_config()?),
        Command::Stats(args) => stats::run(args, &global.load_config()?),
        Command::Config(args) => config::run(args, global),
    }
}

/// The library every command reads from.
fn library_path(config: &MirrorConfig) -> Result<&Path, CliError> {
    config.library_path.as_deref().ok_or_else(|| {
        CliError::Usage(
            "No library given; pass --library or set library_path in the config file".to_string(),
        )
    })
}
