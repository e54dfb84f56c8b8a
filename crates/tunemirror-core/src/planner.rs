//! Two-tree diff and dispatch.
//!
//! The planner walks the source snapshot and, in lockstep, the destination
//! snapshot. For every source entry it finds the destination entry by its
//! destination key (music files change extension when they are encoded),
//! resolves type mismatches by deleting the destination entry, and hands
//! each file to the operator. Copies and filesystem changes happen inline;
//! encodes are submitted to the worker pool.
//!
//! Errors concerning a single entry are passed to the operator's `warn`
//! hook. Only when that hook returns an error does planning stop.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, PlanError, Result};
use crate::operator::Operator;
use crate::policy::{AudioOperation, is_newer};
use crate::pool::{PoolConfig, WorkerPool, default_concurrency};
use crate::snapshot::{Entry, EntryKind, Snapshot};

/// Planning options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOptions {
    /// Ignore every file that is not music.
    pub ignore_data: bool,
    /// Remove unexpected destination entries before syncing a directory.
    pub delete_before: bool,
    /// File names that are never mirrored.
    pub ignore_files: HashSet<String>,
    /// Maximum number of concurrent encodes.
    pub concurrency: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            ignore_data: false,
            delete_before: false,
            ignore_files: HashSet::new(),
            concurrency: default_concurrency(),
        }
    }
}

/// Counts of what a run did, or would do in a dry run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Destination directories created.
    pub dirs_created: usize,
    /// Destination entries removed.
    pub removed: usize,
    /// Files copied.
    pub copied: usize,
    /// Encodes submitted for new files.
    pub transcoded: usize,
    /// Encodes submitted for stale files.
    pub updated: usize,
    /// Files already current.
    pub ok: usize,
    /// Files deliberately not mirrored.
    pub ignored: usize,
    /// Warnings reported by the planner itself.
    pub warnings: usize,
    /// Submitted encodes that failed.
    pub failed_jobs: usize,
    /// Submitted encodes skipped after an abort.
    pub skipped_jobs: usize,
}

impl PlanSummary {
    /// Number of destination writes performed or planned.
    #[must_use]
    pub const fn writes(&self) -> usize {
        self.dirs_created + self.removed + self.copied + self.transcoded + self.updated
    }
}

/// Syncs a destination snapshot towards a source snapshot.
pub struct Planner<'a> {
    src: &'a Snapshot,
    dst: &'a Snapshot,
    op: Arc<dyn Operator>,
    options: PlanOptions,
}

impl std::fmt::Debug for Planner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Planner")
            .field("src", &self.src.root_path())
            .field("dst", &self.dst.root_path())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<'a> Planner<'a> {
    /// Create a planner with default options.
    pub fn new(src: &'a Snapshot, dst: &'a Snapshot, op: Arc<dyn Operator>) -> Self {
        Self {
            src,
            dst,
            op,
            options: PlanOptions::default(),
        }
    }

    /// Replace the planning options.
    #[must_use]
    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    /// Destination key of a source entry.
    ///
    /// Music files get the operator's target extension; everything else
    /// keeps its key.
    pub fn dkey(&self, src: Entry<'_>) -> String {
        if src.is_music() {
            destination_key(src.key(), &self.op.which_ext(src))
        } else {
            src.key().to_string()
        }
    }

    /// Whether a source entry can write its destination key. Music the
    /// encoder cannot handle is only reported as ignored, so it neither
    /// claims the key nor keeps an existing destination alive.
    fn claims_destination(&self, src: Entry<'_>) -> bool {
        src.codec().is_none_or(|codec| self.op.policy().encoder.supports(codec))
    }

    /// Run the sync.
    ///
    /// Returns once every submitted encode has finished. Fails with the
    /// first error the operator's `warn` hook escalated.
    ///
    /// Blocks the calling thread on the worker pool's own runtime, so it
    /// must not be called from async code; inside a Tokio runtime it fails
    /// with [`Error::Internal`].
    pub fn plan(&self) -> Result<PlanSummary> {
        info!(
            "Planning {} -> {}",
            self.src.root_path().display(),
            self.dst.root_path().display()
        );

        let warn_op = Arc::clone(&self.op);
        let pool = WorkerPool::new(
            PoolConfig::with_concurrency(self.options.concurrency),
            move |err| warn_op.warn(err),
        )?;

        let mut run = Run {
            planner: self,
            pool,
            summary: PlanSummary::default(),
        };
        let result = run.plan_dir(self.src.root(), Some(self.dst.root()));
        if result.is_err() {
            run.pool.abort();
        }

        let Run {
            pool, mut summary, ..
        } = run;
        let report = pool.close();
        summary.failed_jobs = report.failed;
        summary.skipped_jobs = report.skipped;

        match (result, report.quit) {
            (Err(Halt(_)), Some(quit)) | (Ok(()), Some(quit)) => Err(quit),
            (Err(Halt(e)), None) => Err(e),
            (Ok(()), None) => {
                info!(
                    "Planning finished: {} writes, {} warnings, {} failed encodes",
                    summary.writes(),
                    summary.warnings,
                    summary.failed_jobs
                );
                Ok(summary)
            }
        }
    }
}

/// An escalated error that stops planning.
#[derive(Debug)]
struct Halt(Error);

type Flow = std::result::Result<(), Halt>;

struct Run<'p, 'a> {
    planner: &'p Planner<'a>,
    pool: WorkerPool,
    summary: PlanSummary,
}

impl<'a> Run<'_, 'a> {
    fn warn(&mut self, err: Error) -> Flow {
        self.summary.warnings += 1;
        self.planner.op.warn(err).map_err(Halt)
    }

    fn plan_dir(&mut self, src: Entry<'a>, dst: Option<Entry<'a>>) -> Flow {
        let planner = self.planner;

        if let Some(dst) = dst
            && planner.options.delete_before
        {
            let expected: HashSet<String> = src
                .children()
                .filter(|&s| planner.claims_destination(s))
                .map(|s| planner.dkey(s))
                .collect();
            for child in dst.children() {
                if !expected.contains(child.key()) {
                    self.remove(child)?;
                }
            }
        } else if dst.is_none() {
            let path = planner.dst.path(src.key());
            match planner.op.create_dir(&path) {
                Ok(()) => self.summary.dirs_created += 1,
                Err(e) => {
                    // Nothing below can be written without the directory.
                    return self.warn(e);
                }
            }
        }

        let mut claimed: HashMap<String, &'a str> = HashMap::new();
        for s in src.children() {
            if self.pool.is_aborted() {
                return Err(Halt(PlanError::Aborted.into()));
            }

            let key = planner.dkey(s);
            if !planner.claims_destination(s) {
                if let Err(e) = self.plan_file(s, None, &key) {
                    self.warn(e)?;
                }
                continue;
            }
            if let Some(first) = claimed.get(&key) {
                let collision = PlanError::DestinationCollision {
                    key,
                    first: (*first).to_string(),
                    second: s.key().to_string(),
                };
                self.warn(collision.into())?;
                continue;
            }
            claimed.insert(key.clone(), s.key());

            let mut d = planner.dst.get(&key);
            if let Some(existing) = d
                && (s.is_dir() != existing.is_dir() || s.is_music() != existing.is_music())
            {
                debug!("Type mismatch at {}", key);
                self.remove(existing)?;
                d = None;
            }

            if s.is_dir() {
                self.plan_dir(s, d)?;
            } else if let Err(e) = self.plan_file(s, d, &key) {
                self.warn(e)?;
            }
        }
        Ok(())
    }

    fn plan_file(&mut self, src: Entry<'a>, dst: Option<Entry<'a>>, key: &str) -> Result<()> {
        let planner = self.planner;
        let path = planner.dst.path(key);

        match src.kind() {
            EntryKind::Error(e) => Err(e.clone().into()),
            EntryKind::Music(_) => self.plan_music(src, dst, path),
            EntryKind::PlainFile => {
                if planner.options.ignore_data
                    || planner.options.ignore_files.contains(src.file_name())
                {
                    planner.op.ignore(&path)?;
                    self.summary.ignored += 1;
                } else if dst.is_some_and(|d| is_newer(d.modified(), src.modified())) {
                    planner.op.ok(&path)?;
                    self.summary.ok += 1;
                } else {
                    planner.op.copy_file(&src.path(), &path)?;
                    self.summary.copied += 1;
                }
                Ok(())
            }
            EntryKind::Directory => Err(Error::Internal(format!(
                "{} is a directory, not a file",
                src.key()
            ))),
        }
    }

    fn plan_music(&mut self, src: Entry<'a>, dst: Option<Entry<'a>>, path: PathBuf) -> Result<()> {
        let planner = self.planner;
        let op = &planner.op;
        match op.which(src, dst)? {
            AudioOperation::Skip => {
                op.ok(&path)?;
                self.summary.ok += 1;
            }
            AudioOperation::Ignore => {
                op.ignore(&path)?;
                self.summary.ignored += 1;
            }
            AudioOperation::Copy => {
                op.copy_file(&src.path(), &path)?;
                self.summary.copied += 1;
            }
            action @ (AudioOperation::Transcode | AudioOperation::Update) => {
                let metadata = src.metadata()?.clone();
                let src_path = src.path();
                let job_op = Arc::clone(op);
                if action == AudioOperation::Update {
                    self.summary.updated += 1;
                    self.pool
                        .submit(move || job_op.update(&src_path, &path, &metadata));
                } else {
                    self.summary.transcoded += 1;
                    self.pool
                        .submit(move || job_op.transcode(&src_path, &path, &metadata));
                }
            }
        }
        Ok(())
    }

    /// Remove a destination entry. Failures go through `warn`.
    fn remove(&mut self, entry: Entry<'a>) -> Flow {
        let planner = self.planner;
        let op = &planner.op;
        let path = entry.path();
        let result = if entry.is_dir() {
            op.remove_dir(&path)
        } else {
            op.remove_file(&path)
        };
        match result {
            Ok(()) => {
                self.summary.removed += 1;
                Ok(())
            }
            Err(e) => self.warn(e),
        }
    }
}

/// Replace the extension of the last component of `key` with `ext`.
///
/// Only the final `.` of the file name counts, and a leading dot does not
/// start an extension, so `a.b.flac` becomes `a.b.mp3` and `.flac` becomes
/// `.flac.mp3`.
#[must_use]
pub fn destination_key(key: &str, ext: &str) -> String {
    let (parent, name) = match key.rsplit_once('/') {
        Some((parent, name)) => (Some(parent), name),
        None => (None, key),
    };
    let stem = match name.rfind('.') {
        Some(pos) if pos > 0 => &name[..pos],
        _ => name,
    };
    match parent {
        Some(parent) => format!("{parent}/{stem}{ext}"),
        None => format!("{stem}{ext}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_key() {
        assert_eq!(destination_key("a.flac", ".mp3"), "a.mp3");
        assert_eq!(destination_key("x/y/a.flac", ".mp3"), "x/y/a.mp3");
        assert_eq!(destination_key("x/a.b.flac", ".opus"), "x/a.b.opus");
        assert_eq!(destination_key("x.y/track", ".mp3"), "x.y/track.mp3");
        assert_eq!(destination_key(".flac", ".mp3"), ".flac.mp3");
        assert_eq!(destination_key("B.MP3", ".MP3"), "B.MP3");
    }

    #[test]
    fn test_summary_writes() {
        let summary = PlanSummary {
            copied: 2,
            transcoded: 1,
            ok: 10,
            ignored: 3,
            ..PlanSummary::default()
        };
        assert_eq!(summary.writes(), 3);
    }

    #[test]
    fn test_default_options() {
        let options = PlanOptions::default();
        assert!(!options.delete_before);
        assert!(options.concurrency >= 1);
    }
}
