//! The `config` command.

use std::path::Path;

use clap::Args;
use tracing::info;
use tunemirror_core::{Error, MirrorConfig};

use super::{CliError, GlobalArgs};

/// Print the effective configuration, or write a default config file.
#[derive(Args, Debug, Default)]
pub struct ConfigArgs {
    /// Write the default configuration to the config file
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

pub fn run(args: &ConfigArgs, global: &GlobalArgs) -> Result<(), CliError> {
    if args.init {
        let path = global
            .config
            .clone()
            .unwrap_or_else(MirrorConfig::config_file_path);
        init(&path, args.force)?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let config = global.load_config()?;
    println!("{}", render(&config)?);
    Ok(())
}

fn init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Usage(format!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        )));
    }
    info!("Writing default configuration to {}", path.display());
    MirrorConfig::default().save_to(path)?;
    Ok(())
}

fn render(config: &MirrorConfig) -> Result<String, CliError> {
    Ok(serde_json::to_string_pretty(config).map_err(Error::from)?)
}
