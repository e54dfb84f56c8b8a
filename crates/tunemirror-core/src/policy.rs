//! Per-file audio decisions.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::encoder::Encoder;
use crate::error::{Error, Result};
use crate::snapshot::Entry;

/// What to do with one music file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioOperation {
    /// Destination is current.
    Skip,
    /// The codec cannot be handled by the encoder.
    Ignore,
    /// Copy the source unchanged.
    Copy,
    /// Encode into a new destination file.
    Transcode,
    /// Replace a stale destination file.
    Update,
}

impl std::fmt::Display for AudioOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Ignore => write!(f, "ignore"),
            Self::Copy => write!(f, "copy"),
            Self::Transcode => write!(f, "transcode"),
            Self::Update => write!(f, "update"),
        }
    }
}

/// Decision rules shared by the dry-run and live operators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    /// Encoder that produces destination files.
    pub encoder: Encoder,
    /// Re-encode every supported file regardless of destination state.
    pub force_transcode: bool,
}

impl Policy {
    /// Create a policy for an encoder.
    #[must_use]
    pub const fn new(encoder: Encoder) -> Self {
        Self {
            encoder,
            force_transcode: false,
        }
    }

    /// Set whether every supported file is re-encoded.
    #[must_use]
    pub const fn with_force_transcode(mut self, force: bool) -> Self {
        self.force_transcode = force;
        self
    }

    /// Extension of the destination file for a music source, with the dot.
    ///
    /// Names ending in one of the encoder's pass-through extensions keep
    /// their extension exactly as spelled.
    #[must_use]
    pub fn which_ext(&self, src: Entry<'_>) -> String {
        let name = src.file_name();
        let lower = name.to_ascii_lowercase();
        for ext in self.encoder.passthrough_extensions() {
            if lower.ends_with(ext) && lower.len() > ext.len() {
                return name[name.len() - ext.len()..].to_string();
            }
        }
        self.encoder.extension().to_string()
    }

    /// Decide what to do with a music source and its destination, if any.
    ///
    /// Fails only when the source metadata is needed and cannot be read.
    pub fn which(&self, src: Entry<'_>, dst: Option<Entry<'_>>) -> Result<AudioOperation> {
        let codec = src.codec().ok_or_else(|| {
            Error::Internal(format!("{} is not a music entry", src.key()))
        })?;

        let op = if !self.encoder.supports(codec) {
            AudioOperation::Ignore
        } else if self.force_transcode {
            AudioOperation::Transcode
        } else {
            match dst {
                Some(d) if d.size() > 0 => {
                    if is_newer(src.modified(), d.modified()) {
                        AudioOperation::Update
                    } else {
                        AudioOperation::Skip
                    }
                }
                _ => {
                    if self.encoder.is_copy_eligible(src.metadata()?) {
                        AudioOperation::Copy
                    } else {
                        AudioOperation::Transcode
                    }
                }
            }
        };

        debug!("{}: {}", src.key(), op);
        Ok(op)
    }
}

/// Equal times count as current; an unknown destination time is stale.
pub(crate) fn is_newer(src: Option<SystemTime>, dst: Option<SystemTime>) -> bool {
    match (src, dst) {
        (Some(s), Some(d)) => s > d,
        (_, None) => true,
        (None, Some(_)) => false,
    }
}
