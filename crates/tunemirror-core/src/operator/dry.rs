//! Dry-run operator.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{Operator, Reporter};
use crate::error::{Error, Result};
use crate::metadata::AudioMetadata;
use crate::policy::Policy;

/// Reports what a live run would do without touching the filesystem.
///
/// Warnings never stop a dry run.
#[derive(Debug)]
pub struct DryRunner {
    policy: Policy,
    reporter: Arc<Reporter>,
}

impl DryRunner {
    /// Create a dry-run operator.
    pub const fn new(policy: Policy, reporter: Arc<Reporter>) -> Self {
        Self { policy, reporter }
    }
}

impl Operator for DryRunner {
    fn policy(&self) -> &Policy {
        &self.policy
    }

    fn ok(&self, dst: &Path) -> Result<()> {
        self.reporter.ok(dst);
        Ok(())
    }

    fn ignore(&self, dst: &Path) -> Result<()> {
        self.reporter.action("ignoring:", dst);
        Ok(())
    }

    fn warn(&self, err: Error) -> Result<()> {
        self.reporter.problem("warning:", &err);
        Ok(())
    }

    fn error(&self, err: Error) -> Result<()> {
        self.reporter.problem("error:", &err);
        Err(err)
    }

    fn create_dir(&self, dst: &Path) -> Result<()> {
        self.reporter.action("mkdir:", dst);
        Ok(())
    }

    fn remove_dir(&self, dst: &Path) -> Result<()> {
        self.reporter.action("rm -r:", dst);
        Ok(())
    }

    fn remove_file(&self, dst: &Path) -> Result<()> {
        self.reporter.action("rm:", dst);
        Ok(())
    }

    fn copy_file(&self, _src: &Path, dst: &Path) -> Result<()> {
        self.reporter.action("cp:", dst);
        Ok(())
    }

    fn transcode(&self, src: &Path, dst: &Path, metadata: &AudioMetadata) -> Result<()> {
        self.reporter.action("encode:", dst);
        debug!(
            "Would encode {} ({}, {} kbps)",
            src.display(),
            metadata.codec,
            metadata.bitrate_kbps
        );
        self.policy.encoder.validate()
    }

    fn update(&self, _src: &Path, dst: &Path, _metadata: &AudioMetadata) -> Result<()> {
        self.reporter.action("update:", dst);
        Ok(())
    }
}
