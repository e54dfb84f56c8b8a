//! The `stats` command.

use std::fmt::Write as _;
use std::sync::Arc;

use clap::Args;
use tunemirror_core::{Error, LibraryStats, LoftyProbe, MirrorConfig, Snapshot, render_tree};

use super::{CliError, library_path};

/// Read the library and show statistics.
#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    /// Show the library tree
    #[arg(short, long)]
    pub tree: bool,

    /// Show standard statistics (the default without --tree)
    #[arg(short, long)]
    pub standard: bool,

    /// Print the standard statistics as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: &StatsArgs, config: &MirrorConfig) -> Result<(), CliError> {
    let library = library_path(config)?;
    let snapshot = Snapshot::build(
        library,
        config.snapshot_options(),
        Arc::new(LoftyProbe::new()),
    )?;
    print!("{}", report(args, &snapshot)?);
    Ok(())
}

fn report(args: &StatsArgs, snapshot: &Snapshot) -> Result<String, CliError> {
    let mut out = String::new();
    if args.tree {
        let _ = writeln!(out, "{}", render_tree(snapshot));
    }
    if args.standard || args.json || !args.tree {
        let stats = LibraryStats::collect(snapshot);
        if args.json {
            let json = serde_json::to_string_pretty(&stats).map_err(Error::from)?;
            let _ = writeln!(out, "{json}");
        } else {
            let _ = writeln!(out, "{}", stats.render());
        }
    }
    Ok(out)
}
