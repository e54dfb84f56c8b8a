//! The `sync` command.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{ArgGroup, Args};
use tracing::info;
use tunemirror_core::{
    AudioProbe, DryRunner, Error, FileSystemError, LoftyProbe, MirrorConfig, Operator,
    PlanSummary, Planner, Policy, Reporter, Runner, Snapshot, TargetFormat,
};

use super::{CliError, library_path};

/// Synchronize from a high-quality library to a lower-quality mirror.
///
/// Lossless music is encoded, lossy music at or below the threshold is
/// copied, other files are copied unless --only-music is given.
#[derive(Args, Debug, Default)]
#[command(group(ArgGroup::new("target").args(["opus", "vorbis", "aac"])))]
pub struct SyncArgs {
    /// Destination library (the mirror)
    pub destination: PathBuf,

    /// Bitrate in kbps up to which same-codec files are copied
    #[arg(short, long, value_name = "KBPS")]
    pub threshold: Option<u32>,

    /// Target MP3 quality (0 = best and largest, 9 = smallest)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(0..=9))]
    pub quality: Option<u8>,

    /// Re-encode all supported music
    #[arg(short, long)]
    pub force: bool,

    /// Only show what would be done
    #[arg(short = 'n', long, alias = "dryrun")]
    pub dry_run: bool,

    /// Delete unexpected files in the destination
    #[arg(short, long)]
    pub delete_before: bool,

    /// Only synchronize music
    #[arg(short = 'm', long)]
    pub only_music: bool,

    /// Number of concurrent encoders
    #[arg(short = 'w', long, value_name = "N")]
    pub concurrent: Option<usize>,

    /// Encode to Opus instead of MP3
    #[arg(short = 'u', long)]
    pub opus: bool,

    /// Encode to Ogg Vorbis instead of MP3
    #[arg(long)]
    pub vorbis: bool,

    /// Encode to AAC instead of MP3
    #[arg(long)]
    pub aac: bool,

    /// Target bitrate for Opus, Vorbis and AAC, such as 96k
    #[arg(short = 'r', long, value_parser = parse_bitrate)]
    pub bitrate: Option<u32>,

    /// Write Opus files with the .ogg extension
    #[arg(long)]
    pub use_ogg_extension: bool,

    /// File name that is never mirrored (repeatable)
    #[arg(long = "ignore", value_name = "NAME")]
    pub ignore: Vec<String>,

    /// Stop at the first warning
    #[arg(long)]
    pub fail_fast: bool,
}

impl SyncArgs {
    fn apply(&self, config: &mut MirrorConfig) {
        if let Some(threshold) = self.threshold {
            config.bitrate_threshold = threshold;
        }
        if let Some(quality) = self.quality {
            config.quality = quality;
        }
        if let Some(concurrent) = self.concurrent {
            config.concurrency = Some(concurrent);
        }
        if let Some(bitrate) = self.bitrate {
            config.target_bitrate_kbps = bitrate;
        }
        if self.opus {
            config.target = TargetFormat::Opus;
        } else if self.vorbis {
            config.target = TargetFormat::Vorbis;
        } else if self.aac {
            config.target = TargetFormat::Aac;
        }
        config.use_ogg_extension |= self.use_ogg_extension;
        config.delete_before |= self.delete_before;
        config.only_music |= self.only_music;
        config.ignore_files.extend(self.ignore.iter().cloned());
    }
}

/// Accepts kbps with an optional `k` suffix.
fn parse_bitrate(s: &str) -> Result<u32, String> {
    let digits = s.trim().trim_end_matches(['k', 'K']);
    let kbps: u32 = digits
        .parse()
        .map_err(|_| format!("invalid bitrate '{s}', expected kbps such as 96k"))?;
    if kbps == 0 {
        return Err("bitrate must be greater than 0".to_string());
    }
    Ok(kbps)
}

pub fn run(args: &SyncArgs, mut config: MirrorConfig) -> Result<(), CliError> {
    args.apply(&mut config);
    config.validate()?;
    let library = library_path(&config)?.to_path_buf();
    prepare_destination(&args.destination, args.dry_run)?;

    let probe: Arc<dyn AudioProbe> = Arc::new(LoftyProbe::new());
    let options = config.snapshot_options();

    println!("Reading source library (this might take a while)...");
    let src = Snapshot::build(&library, options, Arc::clone(&probe))?;
    println!("Reading destination library (this might take a while)...");
    let dst = Snapshot::build(&args.destination, options, probe)?;

    if src.root_path() == dst.root_path() {
        return Err(CliError::Usage(
            "Source and destination are the same directory".to_string(),
        ));
    }

    let reporter = Arc::new(
        Reporter::stdio()
            .strip_prefix(dst.root_path())
            .strip_prefix(src.root_path())
            .verbose(config.verbose),
    );
    let policy = Policy::new(config.encoder()).with_force_transcode(args.force);
    let op: Arc<dyn Operator> = if args.dry_run {
        Arc::new(DryRunner::new(policy, reporter))
    } else {
        Arc::new(Runner::new(policy, reporter).fail_fast(args.fail_fast))
    };

    info!(
        "Syncing {} -> {} as {}",
        src.root_path().display(),
        dst.root_path().display(),
        config.target
    );
    let summary = Planner::new(&src, &dst, op)
        .with_options(config.plan_options())
        .plan()?;
    println!("{}", summary_line(&summary, args.dry_run));
    Ok(())
}

/// A missing destination is created, except in a dry run.
fn prepare_destination(path: &Path, dry_run: bool) -> Result<(), CliError> {
    if dry_run || path.exists() {
        return Ok(());
    }
    info!("Creating destination {}", path.display());
    fs::create_dir_all(path).map_err(|e| {
        Error::FileSystem(FileSystemError::CreateDirFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    })?;
    Ok(())
}

fn summary_line(summary: &PlanSummary, dry_run: bool) -> String {
    let head = if dry_run { "Would do" } else { "Done" };
    let mut line = format!(
        "{head}: {} copied, {} encoded, {} updated, {} removed, {} directories created; \
         {} current, {} ignored",
        summary.copied,
        summary.transcoded,
        summary.updated,
        summary.removed,
        summary.dirs_created,
        summary.ok,
        summary.ignored
    );
    if summary.warnings + summary.failed_jobs > 0 {
        line.push_str(&format!(
            "; {} warnings, {} failed encodes",
            summary.warnings, summary.failed_jobs
        ));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser, Debug)]
    struct Wrapper {
        #[command(flatten)]
        args: SyncArgs,
    }

    fn parse(argv: &[&str]) -> SyncArgs {
        let mut full = vec!["sync"];
        full.extend_from_slice(argv);
        Wrapper::try_parse_from(full).expect("valid arguments").args
    }

    #[test]
    fn test_flags_override_config() {
        let args = parse(&[
            "/mnt/player", "-t", "192", "-q", "2", "-w", "3", "-d", "-m", "--ignore", "Thumbs.db",
        ]);
        let mut config = MirrorConfig::default();
        args.apply(&mut config);

        assert_eq!(config.bitrate_threshold, 192);
        assert_eq!(config.quality, 2);
        assert_eq!(config.concurrency, Some(3));
        assert!(config.delete_before);
        assert!(config.only_music);
        assert_eq!(config.ignore_files, vec!["Thumbs.db".to_string()]);
        assert_eq!(config.target, TargetFormat::Mp3);
    }

    #[test]
    fn test_opus_target() {
        let args = parse(&["/mnt/player", "--opus", "-r", "128k", "--use-ogg-extension"]);
        let mut config = MirrorConfig::default();
        args.apply(&mut config);

        assert_eq!(config.target, TargetFormat::Opus);
        assert_eq!(config.target_bitrate_kbps, 128);
        assert_eq!(config.encoder().extension(), ".ogg");
    }

    #[test]
    fn test_targets_are_exclusive() {
        let result = Wrapper::try_parse_from(["sync", "/mnt/player", "--opus", "--aac"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_quality_range() {
        assert!(Wrapper::try_parse_from(["sync", "/mnt/player", "-q", "10"]).is_err());
        assert!(Wrapper::try_parse_from(["sync", "/mnt/player", "--dryrun"]).is_ok());
    }

    #[test]
    fn test_parse_bitrate() {
        assert_eq!(parse_bitrate("96k"), Ok(96));
        assert_eq!(parse_bitrate("160"), Ok(160));
        assert!(parse_bitrate("0").is_err());
        assert!(parse_bitrate("fast").is_err());
    }

    #[test]
    fn test_prepare_destination() {
        let dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let dst = dir.path().join("mirror");

        prepare_destination(&dst, true).expect("dry run");
        assert!(!dst.exists());
        prepare_destination(&dst, false).expect("create");
        assert!(dst.is_dir());
    }

    #[test]
    fn test_summary_line() {
        let summary = PlanSummary {
            copied: 2,
            transcoded: 1,
            ok: 4,
            ..PlanSummary::default()
        };
        let line = summary_line(&summary, true);
        assert!(line.starts_with("Would do: 2 copied, 1 encoded"));
        assert!(!line.contains("warnings"));

        let failed = PlanSummary {
            failed_jobs: 1,
            ..summary
        };
        assert!(summary_line(&failed, false).ends_with("0 warnings, 1 failed encodes"));
    }
}
