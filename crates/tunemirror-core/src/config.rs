//! Mirror configuration management.
//!
//! Settings are stored as pretty JSON in the user's configuration
//! directory. Every field has a default so partial files load; command-line
//! flags override whatever the file says.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::encoder::{
    DEFAULT_BITRATE_THRESHOLD, DEFAULT_QUALITY, DEFAULT_TARGET_BITRATE, Encoder, LossyEncoder,
    Mp3Encoder,
};
use crate::error::{Error, FileSystemError, Result};
use crate::planner::PlanOptions;
use crate::pool::default_concurrency;
use crate::snapshot::SnapshotOptions;

/// Output format of the mirror.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// MP3 with a VBR quality (default).
    #[default]
    Mp3,
    /// Opus at a fixed bitrate.
    Opus,
    /// Ogg Vorbis at a fixed bitrate.
    Vorbis,
    /// AAC at a fixed bitrate.
    Aac,
}

impl std::fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mp3 => write!(f, "mp3"),
            Self::Opus => write!(f, "opus"),
            Self::Vorbis => write!(f, "vorbis"),
            Self::Aac => write!(f, "aac"),
        }
    }
}

/// Mirror configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MirrorConfig {
    /// High-quality source library.
    pub library_path: Option<PathBuf>,
    /// Same-codec sources at or below this bitrate (kbps) are copied.
    pub bitrate_threshold: u32,
    /// MP3 VBR quality, 0 (best) to 9 (smallest).
    pub quality: u8,
    /// Output format.
    pub target: TargetFormat,
    /// Bitrate (kbps) for Opus, Vorbis and AAC output.
    pub target_bitrate_kbps: u32,
    /// Write Opus files with the `.ogg` extension.
    pub use_ogg_extension: bool,
    /// Number of concurrent encodes; the CPU count when unset.
    pub concurrency: Option<usize>,
    /// Skip dot-prefixed files and directories.
    pub ignore_hidden: bool,
    /// Follow symbolic links while reading libraries.
    pub follow_symlinks: bool,
    /// Delete unexpected destination entries.
    pub delete_before: bool,
    /// Only mirror music.
    pub only_music: bool,
    /// File names that are never mirrored.
    pub ignore_files: Vec<String>,
    /// Report files that are already current.
    pub verbose: bool,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            library_path: None,
            bitrate_threshold: DEFAULT_BITRATE_THRESHOLD,
            quality: DEFAULT_QUALITY,
            target: TargetFormat::default(),
            target_bitrate_kbps: DEFAULT_TARGET_BITRATE,
            use_ogg_extension: false,
            concurrency: None,
            ignore_hidden: true,
            follow_symlinks: true,
            delete_before: false,
            only_music: false,
            ignore_files: Vec::new(),
            verbose: false,
        }
    }
}

impl MirrorConfig {
    /// Load configuration from the default location, or defaults if there is
    /// no file yet.
    pub fn load() -> Result<Self> {
        let path = config_file_path();
        if !path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load configuration from a specific file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::FileSystem(FileSystemError::ReadFailed {
                path: path.to_path_buf(),
                reason: format!("Failed to read config file: {e}"),
            })
        })?;

        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Configuration(format!("Failed to parse config file: {e}")))?;

        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::FileSystem(FileSystemError::CreateDirFailed {
                    path: parent.to_path_buf(),
                    reason: format!("Failed to create config directory: {e}"),
                })
            })?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content).map_err(|e| {
            Error::FileSystem(FileSystemError::WriteFailed {
                path: path.to_path_buf(),
                reason: format!("Failed to write config file: {e}"),
            })
        })?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Check that every value is in range.
    pub fn validate(&self) -> Result<()> {
        if self.quality > 9 {
            return Err(Error::Configuration(format!(
                "Quality must be between 0 and 9, got {}",
                self.quality
            )));
        }
        if !(32..=500).contains(&self.bitrate_threshold) {
            return Err(Error::Configuration(format!(
                "Bitrate threshold must be between 32 and 500 kbps, got {}",
                self.bitrate_threshold
            )));
        }
        if self.concurrency == Some(0) {
            return Err(Error::Configuration(
                "Concurrency must be at least 1".to_string(),
            ));
        }
        self.encoder().validate()
    }

    /// Encoder described by this configuration.
    #[must_use]
    pub fn encoder(&self) -> Encoder {
        let threshold = self.bitrate_threshold;
        match self.target {
            TargetFormat::Mp3 => Encoder::Mp3(Mp3Encoder {
                quality: self.quality,
                bitrate_threshold: threshold,
            }),
            TargetFormat::Opus => Encoder::Lossy(
                LossyEncoder::opus(self.target_bitrate_kbps, self.use_ogg_extension)
                    .with_bitrate_threshold(threshold),
            ),
            TargetFormat::Vorbis => Encoder::Lossy(
                LossyEncoder::vorbis(self.target_bitrate_kbps).with_bitrate_threshold(threshold),
            ),
            TargetFormat::Aac => Encoder::Lossy(
                LossyEncoder::aac(self.target_bitrate_kbps).with_bitrate_threshold(threshold),
            ),
        }
    }

    /// Options for reading libraries.
    #[must_use]
    pub const fn snapshot_options(&self) -> SnapshotOptions {
        SnapshotOptions {
            ignore_hidden: self.ignore_hidden,
            follow_symlinks: self.follow_symlinks,
            sorted: true,
        }
    }

    /// Options for planning a sync.
    #[must_use]
    pub fn plan_options(&self) -> PlanOptions {
        PlanOptions {
            ignore_data: self.only_music,
            delete_before: self.delete_before,
            ignore_files: self.ignore_files.iter().cloned().collect::<HashSet<_>>(),
            concurrency: self.concurrency.unwrap_or_else(default_concurrency),
        }
    }

    /// Get the path to the config file.
    #[must_use]
    pub fn config_file_path() -> PathBuf {
        config_file_path()
    }
}

fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")))
        .join("tunemirror")
        .join("config.json")
}
