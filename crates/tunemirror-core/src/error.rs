//! Error types for Tunemirror core operations.
//!
//! Every fallible operation in this crate returns [`Result`]. Domain errors
//! are grouped into sub-enums that only carry owned strings, which keeps them
//! cheap to clone: an [`EntryError`] is stored inside a snapshot entry and
//! handed out again every time the entry is visited.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`], used to decide how loudly to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing roots, invalid configuration, pool construction failures.
    Setup,
    /// A single library entry could not be read or classified.
    Entry,
    /// A filesystem operation or external encoder failed.
    Execution,
    /// Planning stopped because a warning escalated.
    Aborted,
    /// A bug in this crate or one of its collaborators.
    Internal,
}

/// Errors that can occur in Tunemirror core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// File system operation failed.
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    /// A library entry could not be read.
    #[error(transparent)]
    Entry(#[from] EntryError),

    /// An external encoder exited unsuccessfully.
    #[error(transparent)]
    Exec(#[from] ExecError),

    /// Planning failed.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error that should not happen.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FileSystem(FileSystemError::NotFound { .. } | FileSystemError::NotADirectory { .. })
            | Self::Configuration(_) => ErrorKind::Setup,
            Self::FileSystem(_) | Self::Exec(_) | Self::Io(_) => ErrorKind::Execution,
            Self::Entry(_) => ErrorKind::Entry,
            Self::Plan(PlanError::Aborted) => ErrorKind::Aborted,
            Self::Plan(PlanError::DestinationCollision { .. }) => ErrorKind::Entry,
            Self::Serialization(_) => ErrorKind::Setup,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Captured process output, if this error came from an external encoder.
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Exec(e) => Some(&e.output),
            _ => None,
        }
    }

    /// Converts an I/O error for read operations.
    pub(crate) fn read(path: &Path, e: &io::Error) -> Self {
        Self::FileSystem(FileSystemError::ReadFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Converts an I/O error for directory creation.
    pub(crate) fn create_dir(path: &Path, e: &io::Error) -> Self {
        Self::FileSystem(FileSystemError::CreateDirFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Converts an I/O error for delete operations.
    pub(crate) fn delete(path: &Path, e: &io::Error) -> Self {
        Self::FileSystem(FileSystemError::DeleteFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Converts an I/O error for copy operations.
    pub(crate) fn copy(src: &Path, dst: &Path, e: &io::Error) -> Self {
        Self::FileSystem(FileSystemError::CopyFailed {
            source_path: src.to_path_buf(),
            destination: dst.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// File system errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FileSystemError {
    /// Path does not exist.
    #[error("Path not found: {path}")]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// Path exists but is not a directory.
    #[error("Not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// Reading failed.
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// Path that could not be read.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Writing failed.
    #[error("Failed to write {path}: {reason}")]
    WriteFailed {
        /// Path that could not be written.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Directory creation failed.
    #[error("Failed to create directory {path}: {reason}")]
    CreateDirFailed {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Deletion failed.
    #[error("Failed to delete {path}: {reason}")]
    DeleteFailed {
        /// Path that could not be deleted.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Copy failed.
    #[error("Failed to copy {source_path} to {destination}: {reason}")]
    CopyFailed {
        /// Source of the copy.
        source_path: PathBuf,
        /// Destination of the copy.
        destination: PathBuf,
        /// Underlying reason.
        reason: String,
    },
}

/// An error attached to a single library entry.
///
/// Stored on Error-classified entries and on music entries whose metadata
/// could not be read, so it must stay cheap to clone.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntryError {
    /// The entry could not be stat'ed or listed while walking.
    #[error("Cannot access {path}: {reason}")]
    Unreadable {
        /// Absolute path of the entry.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// The entry name is not valid UTF-8 and cannot be mirrored.
    #[error("Cannot mirror {path}: name is not valid UTF-8")]
    InvalidName {
        /// Absolute path of the entry.
        path: PathBuf,
    },

    /// Audio identification failed with an I/O error.
    #[error("Cannot identify {path}: {reason}")]
    Identify {
        /// Absolute path of the entry.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },

    /// Audio metadata could not be read.
    #[error("Cannot read audio metadata from {path}: {reason}")]
    Metadata {
        /// Absolute path of the entry.
        path: PathBuf,
        /// Underlying reason.
        reason: String,
    },
}

/// An external program exited unsuccessfully.
///
/// The combined stdout and stderr is kept so that feedback hooks can show
/// exactly what the encoder complained about.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{program} failed on {path}: {status}")]
pub struct ExecError {
    /// Program that was run.
    pub program: String,
    /// File being produced.
    pub path: PathBuf,
    /// Exit status or spawn failure description.
    pub status: String,
    /// Combined stdout and stderr.
    pub output: String,
}

/// Planning errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    /// Two source entries map onto the same destination key.
    #[error("Destination {key} is already claimed by {first}, skipping {second}")]
    DestinationCollision {
        /// Contested destination key.
        key: String,
        /// Source key that claimed the destination first.
        first: String,
        /// Source key that was skipped.
        second: String,
    },

    /// Planning stopped after a warning escalated.
    #[error("Planning aborted")]
    Aborted,
}
