//! Live operator.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use super::{Operator, Reporter};
use crate::error::{Error, Result};
use crate::metadata::AudioMetadata;
use crate::policy::Policy;

/// Performs every action against the destination filesystem.
#[derive(Debug)]
pub struct Runner {
    policy: Policy,
    reporter: Arc<Reporter>,
    fail_fast: bool,
}

impl Runner {
    /// Create a live operator.
    pub const fn new(policy: Policy, reporter: Arc<Reporter>) -> Self {
        Self {
            policy,
            reporter,
            fail_fast: false,
        }
    }

    /// Stop the run at the first warning.
    #[must_use]
    pub const fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }
}

impl Operator for Runner {
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
        if self.fail_fast {
            return Err(err);
        }
        Ok(())
    }

    fn error(&self, err: Error) -> Result<()> {
        self.reporter.problem("error:", &err);
        Err(err)
    }

    fn create_dir(&self, dst: &Path) -> Result<()> {
        self.reporter.action("mkdir:", dst);
        fs::create_dir_all(dst).map_err(|e| Error::create_dir(dst, &e))
    }

    fn remove_dir(&self, dst: &Path) -> Result<()> {
        self.reporter.action("rm -r:", dst);
        fs::remove_dir_all(dst).map_err(|e| Error::delete(dst, &e))
    }

    fn remove_file(&self, dst: &Path) -> Result<()> {
        self.reporter.action("rm:", dst);
        fs::remove_file(dst).map_err(|e| Error::delete(dst, &e))
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> Result<()> {
        self.reporter.action("cp:", dst);
        let bytes = fs::copy(src, dst).map_err(|e| Error::copy(src, dst, &e))?;
        debug!("Copied {} bytes to {}", bytes, dst.display());
        Ok(())
    }

    fn transcode(&self, src: &Path, dst: &Path, metadata: &AudioMetadata) -> Result<()> {
        self.reporter.action("encode:", dst);
        self.policy.encoder.encode(src, dst, metadata)?;
        info!("Encoded {}", dst.display());
        Ok(())
    }

    fn update(&self, src: &Path, dst: &Path, metadata: &AudioMetadata) -> Result<()> {
        self.reporter.action("update:", dst);
        match fs::remove_file(dst) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::delete(dst, &e)),
        }

        if self.policy.encoder.is_copy_eligible(metadata) {
            fs::copy(src, dst).map_err(|e| Error::copy(src, dst, &e))?;
            return Ok(());
        }
        self.policy.encoder.encode(src, dst, metadata)
    }
}
