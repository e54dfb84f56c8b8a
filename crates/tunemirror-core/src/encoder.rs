//! External encoder invocation.
//!
//! Encoders are a closed set: re-encoding to MP3 with a VBR quality setting,
//! or encoding to another lossy codec at a fixed bitrate. Both shell out to
//! `lame` or `ffmpeg` and capture the combined process output so a failure
//! can be shown to the user verbatim.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::process::Command;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::Codec;
use crate::error::{Error, ExecError, Result};
use crate::metadata::AudioMetadata;

/// Default MP3 VBR quality (0 = best, 9 = smallest).
pub const DEFAULT_QUALITY: u8 = 4;
/// Default bitrate in kbps up to which same-codec sources are copied.
pub const DEFAULT_BITRATE_THRESHOLD: u32 = 256;
/// Default target bitrate in kbps for fixed-bitrate lossy targets.
pub const DEFAULT_TARGET_BITRATE: u32 = 96;

/// Re-encodes to MP3 with a VBR quality level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mp3Encoder {
    /// LAME VBR quality, 0..=9.
    pub quality: u8,
    /// MP3 sources at or below this bitrate are copied.
    pub bitrate_threshold: u32,
}

impl Default for Mp3Encoder {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            bitrate_threshold: DEFAULT_BITRATE_THRESHOLD,
        }
    }
}

/// Encodes to Opus, Vorbis or AAC at a fixed target bitrate through ffmpeg.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LossyEncoder {
    /// Target codec.
    pub codec: Codec,
    /// Extension of produced files, including the leading dot.
    pub extension: String,
    /// Target bitrate in kbps.
    pub target_bitrate_kbps: u32,
    /// Same-codec sources at or below this bitrate are copied.
    pub bitrate_threshold: u32,
}

impl LossyEncoder {
    /// Opus output, written as `.opus` or, if requested, `.ogg`.
    #[must_use]
    pub fn opus(target_bitrate_kbps: u32, use_ogg_extension: bool) -> Self {
        let extension = if use_ogg_extension { ".ogg" } else { ".opus" };
        Self {
            codec: Codec::Opus,
            extension: extension.to_string(),
            target_bitrate_kbps,
            bitrate_threshold: DEFAULT_BITRATE_THRESHOLD,
        }
    }

    /// Ogg Vorbis output.
    #[must_use]
    pub fn vorbis(target_bitrate_kbps: u32) -> Self {
        Self {
            codec: Codec::Vorbis,
            extension: Codec::Vorbis.extension().to_string(),
            target_bitrate_kbps,
            bitrate_threshold: DEFAULT_BITRATE_THRESHOLD,
        }
    }

    /// AAC output in an MP4 container.
    #[must_use]
    pub fn aac(target_bitrate_kbps: u32) -> Self {
        Self {
            codec: Codec::Aac,
            extension: Codec::Aac.extension().to_string(),
            target_bitrate_kbps,
            bitrate_threshold: DEFAULT_BITRATE_THRESHOLD,
        }
    }

    /// Set the copy threshold.
    #[must_use]
    pub const fn with_bitrate_threshold(mut self, kbps: u32) -> Self {
        self.bitrate_threshold = kbps;
        self
    }

    const fn ffmpeg_codec(&self) -> &'static str {
        match self.codec {
            Codec::Vorbis => "libvorbis",
            Codec::Aac => "aac",
            _ => "libopus",
        }
    }
}

/// The encoder used by a live run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Encoder {
    /// MP3 through lame or ffmpeg.
    Mp3(Mp3Encoder),
    /// Other lossy codec through ffmpeg.
    Lossy(LossyEncoder),
}

impl Default for Encoder {
    fn default() -> Self {
        Self::Mp3(Mp3Encoder::default())
    }
}

impl Encoder {
    /// Codec of produced files.
    #[must_use]
    pub const fn target_codec(&self) -> Codec {
        match self {
            Self::Mp3(_) => Codec::Mp3,
            Self::Lossy(e) => e.codec,
        }
    }

    /// Extension of produced files, including the leading dot.
    #[must_use]
    pub fn extension(&self) -> &str {
        match self {
            Self::Mp3(_) => Codec::Mp3.extension(),
            Self::Lossy(e) => &e.extension,
        }
    }

    /// Extensions that are kept as they are in destination names.
    #[must_use]
    pub const fn passthrough_extensions(&self) -> &'static [&'static str] {
        match self.target_codec() {
            Codec::Opus => &[".opus", ".ogg"],
            Codec::Vorbis => &[".ogg", ".oga"],
            Codec::Aac => &[".m4a", ".aac", ".mp4"],
            _ => &[".mp3"],
        }
    }

    /// Whether sources of this codec can be handled at all.
    ///
    /// Lossless sources always can; lossy ones only when they already have
    /// the target codec.
    #[must_use]
    pub fn supports(&self, codec: Codec) -> bool {
        codec.is_lossless() || codec == self.target_codec()
    }

    /// Bitrate at or below which same-codec sources are copied.
    #[must_use]
    pub const fn bitrate_threshold(&self) -> u32 {
        match self {
            Self::Mp3(e) => e.bitrate_threshold,
            Self::Lossy(e) => e.bitrate_threshold,
        }
    }

    /// Whether a source can be copied instead of re-encoded.
    #[must_use]
    pub fn is_copy_eligible(&self, metadata: &AudioMetadata) -> bool {
        metadata.codec == self.target_codec() && metadata.bitrate_kbps <= self.bitrate_threshold()
    }

    /// Check encoder settings.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Mp3(e) if e.quality > 9 => Err(Error::Configuration(format!(
                "VBR quality must be between 0 and 9, got {}",
                e.quality
            ))),
            Self::Lossy(e) if !matches!(e.codec, Codec::Opus | Codec::Vorbis | Codec::Aac) => {
                Err(Error::Configuration(format!("Cannot encode to {}", e.codec)))
            }
            Self::Lossy(e) if e.target_bitrate_kbps == 0 => Err(Error::Configuration(
                "Target bitrate must be greater than 0".to_string(),
            )),
            Self::Lossy(e) if !e.extension.starts_with('.') => Err(Error::Configuration(format!(
                "Extension must start with a dot: {}",
                e.extension
            ))),
            _ => Ok(()),
        }
    }

    /// Program and arguments that encode `src` into `dst`.
    #[must_use]
    pub fn command(
        &self,
        src: &Path,
        dst: &Path,
        metadata: &AudioMetadata,
    ) -> (&'static str, Vec<OsString>) {
        match self {
            Self::Mp3(e) if metadata.codec == Codec::Mp3 => (
                "lame",
                vec![
                    "--mp3input".into(),
                    "-h".into(),
                    format!("-V{}", e.quality).into(),
                    src.into(),
                    dst.into(),
                ],
            ),
            Self::Mp3(e) => (
                "ffmpeg",
                vec![
                    "-nostdin".into(),
                    "-y".into(),
                    "-i".into(),
                    src.into(),
                    "-qscale:a".into(),
                    e.quality.to_string().into(),
                    dst.into(),
                ],
            ),
            Self::Lossy(e) => (
                "ffmpeg",
                vec![
                    "-nostdin".into(),
                    "-y".into(),
                    "-i".into(),
                    src.into(),
                    "-vn".into(),
                    "-c:a".into(),
                    e.ffmpeg_codec().into(),
                    "-b:a".into(),
                    format!("{}k", e.target_bitrate_kbps).into(),
                    dst.into(),
                ],
            ),
        }
    }

    /// Encode `src` into `dst`.
    ///
    /// On failure the partial output is removed and the error carries the
    /// encoder's combined stdout and stderr.
    pub fn encode(&self, src: &Path, dst: &Path, metadata: &AudioMetadata) -> Result<()> {
        self.validate()?;
        let (program, args) = self.command(src, dst, metadata);
        debug!("Executing command: {} {:?}", program, args);

        let output = Command::new(program).args(&args).output().map_err(|e| ExecError {
            program: program.to_string(),
            path: dst.to_path_buf(),
            status: format!("failed to start: {e}"),
            output: String::new(),
        })?;

        if output.status.success() {
            debug!("Encoded {} -> {}", src.display(), dst.display());
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if dst.exists()
            && let Err(e) = fs::remove_file(dst)
        {
            debug!("Failed to remove partial output {}: {}", dst.display(), e);
        }

        Err(ExecError {
            program: program.to_string(),
            path: dst.to_path_buf(),
            status: output.status.to_string(),
            output: combined,
        }
        .into())
    }
}
