//! Errors surfaced by the command line.

use tracing::error;
use tunemirror_core::{Error, ErrorKind};

use crate::logging::LoggingError;

/// Anything that makes a command fail.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The core library failed.
    #[error(transparent)]
    Core(#[from] Error),

    /// Logging could not be set up.
    #[error(transparent)]
    Logging(#[from] LoggingError),

    /// The command line or configuration is incomplete.
    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Classification of the underlying core error, if any.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Core(e) => Some(e.kind()),
            Self::Logging(_) | Self::Usage(_) => None,
        }
    }
}

/// Log a failed command with its classification.
pub fn log_failure(e: &CliError) {
    match e.kind() {
        Some(kind) => error!("Command failed [kind={:?}]: {}", kind, e),
        None => error!("Command failed: {}", e),
    }
}
