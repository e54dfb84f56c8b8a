//! Decision-and-execution strategies.
//!
//! The planner never touches the destination itself. It asks an
//! [`Operator`] what to do with each music file and then calls the
//! operator's primitives. Feedback hooks (`ok`, `ignore`, `warn`, `error`)
//! give the operator full control over what is shown and over whether a
//! warning stops the run.
//!
//! Two operators exist: [`DryRunner`] only reports what would happen and
//! [`Runner`] performs it. Both share a [`Policy`](crate::policy::Policy)
//! and a [`Reporter`].

mod dry;
mod reporter;
mod runner;

pub use dry::DryRunner;
pub use reporter::Reporter;
pub use runner::Runner;

use std::path::Path;

use crate::error::{Error, Result};
use crate::metadata::AudioMetadata;
use crate::policy::{AudioOperation, Policy};
use crate::snapshot::Entry;

/// Decides per-file actions and carries them out.
///
/// Paths handed to the primitives are absolute. Every method may be called
/// from worker threads, hence `Send + Sync`.
pub trait Operator: Send + Sync {
    /// Decision rules of this operator.
    fn policy(&self) -> &Policy;

    /// Destination extension for a music source, including the dot.
    fn which_ext(&self, src: Entry<'_>) -> String {
        self.policy().which_ext(src)
    }

    /// Decide what to do with a music source and its destination, if any.
    fn which(&self, src: Entry<'_>, dst: Option<Entry<'_>>) -> Result<AudioOperation> {
        self.policy().which(src, dst)
    }

    /// The destination is already current.
    fn ok(&self, dst: &Path) -> Result<()>;

    /// The source is deliberately not mirrored.
    fn ignore(&self, dst: &Path) -> Result<()>;

    /// Report a recoverable error. Returning `Err` stops the run.
    fn warn(&self, err: Error) -> Result<()>;

    /// Report an error that stops the run.
    fn error(&self, err: Error) -> Result<()>;

    /// Create a destination directory and any missing parents.
    fn create_dir(&self, dst: &Path) -> Result<()>;

    /// Remove a destination directory recursively.
    fn remove_dir(&self, dst: &Path) -> Result<()>;

    /// Remove a destination file.
    fn remove_file(&self, dst: &Path) -> Result<()>;

    /// Copy a source file to the destination.
    fn copy_file(&self, src: &Path, dst: &Path) -> Result<()>;

    /// Encode a source file into a new destination file.
    fn transcode(&self, src: &Path, dst: &Path, metadata: &AudioMetadata) -> Result<()>;

    /// Replace a stale destination file.
    fn update(&self, src: &Path, dst: &Path, metadata: &AudioMetadata) -> Result<()>;
}
