//! Audio classification gateway.
//!
//! The snapshot asks an [`AudioProbe`] two questions about every leaf:
//! which codec it holds (cheap, asked while walking) and, later and only for
//! music, what its metadata is (expensive, asked lazily and memoized by the
//! entry).
//!
//! [`LoftyProbe`] is the production implementation. It reads stream
//! properties and generic tags with `lofty`, and ID3v2 tags of MP3 files with
//! `id3`.
//!
//! # Example
//!
//! ```rust,ignore
//! use tunemirror_core::metadata::{AudioProbe, LoftyProbe};
//! use std::path::Path;
//!
//! let probe = LoftyProbe::new();
//! if let Some(codec) = probe.identify(Path::new("song.flac"))? {
//!     let md = probe.read_metadata(Path::new("song.flac"))?;
//!     println!("{codec}: {} kbps", md.bitrate_kbps);
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use id3::{Tag, TagLike};
use lofty::file::{AudioFile, FileType, TaggedFileExt};
use lofty::probe::Probe;
use lofty::tag::{Accessor, ItemKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::error::EntryError;

/// Result of a gateway call; failures are recorded on the entry.
pub type ProbeResult<T> = std::result::Result<T, EntryError>;

/// Metadata read from an audio file.
///
/// Tag fields are optional since tags may not be present. Stream properties
/// (`codec`, `bitrate_kbps`, `duration`) always are.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioMetadata {
    /// Track title.
    pub title: Option<String>,
    /// Track artist.
    pub artist: Option<String>,
    /// Album name.
    pub album: Option<String>,
    /// Album artist (may differ from track artist for compilations).
    pub album_artist: Option<String>,
    /// Composer.
    pub composer: Option<String>,
    /// Genre.
    pub genre: Option<String>,
    /// Release year.
    pub year: Option<i32>,
    /// Track number within the disc.
    pub track_number: Option<u32>,
    /// Total tracks on the disc.
    pub total_tracks: Option<u32>,
    /// Disc number.
    pub disc_number: Option<u32>,
    /// Total discs in the release.
    pub total_discs: Option<u32>,
    /// Play time.
    pub duration: Duration,
    /// Encoding of the audio stream.
    pub codec: Codec,
    /// Average audio bitrate in kbps.
    pub bitrate_kbps: u32,
    /// Last modification time of the file.
    pub modified: Option<SystemTime>,
}

impl AudioMetadata {
    /// Create metadata with stream properties only and no tags.
    #[must_use]
    pub const fn new(codec: Codec, bitrate_kbps: u32) -> Self {
        Self {
            title: None,
            artist: None,
            album: None,
            album_artist: None,
            composer: None,
            genre: None,
            year: None,
            track_number: None,
            total_tracks: None,
            disc_number: None,
            total_discs: None,
            duration: Duration::ZERO,
            codec,
            bitrate_kbps,
            modified: None,
        }
    }

    /// Get a display title, falling back to a default if title is not set.
    #[must_use]
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown Title")
    }

    /// Get a display artist, falling back to a default if artist is not set.
    #[must_use]
    pub fn display_artist(&self) -> &str {
        self.artist.as_deref().unwrap_or("Unknown Artist")
    }

    /// Format duration as M:SS.
    #[must_use]
    pub fn formatted_duration(&self) -> String {
        let secs = self.duration.as_secs();
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

/// Identifies audio files and reads their metadata.
#[cfg_attr(test, mockall::automock)]
pub trait AudioProbe: Send + Sync {
    /// Identify the codec of a file.
    ///
    /// Returns `Ok(None)` for files that are not audio, and an error only
    /// when the file could not be inspected at all.
    fn identify(&self, path: &Path) -> ProbeResult<Option<Codec>>;

    /// Read the full metadata of an audio file.
    fn read_metadata(&self, path: &Path) -> ProbeResult<AudioMetadata>;
}

/// Production gateway backed by `lofty` and `id3`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoftyProbe;

impl LoftyProbe {
    /// Create a new probe.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl AudioProbe for LoftyProbe {
    fn identify(&self, path: &Path) -> ProbeResult<Option<Codec>> {
        // Only files with a known audio extension are opened at all.
        if Codec::from_path(path).is_none() {
            return Ok(None);
        }

        let probe = Probe::open(path)
            .map_err(|e| identify_error(path, &e))?
            .guess_file_type()
            .map_err(|e| identify_error(path, &e))?;

        Ok(probe.file_type().and_then(codec_from_file_type))
    }

    fn read_metadata(&self, path: &Path) -> ProbeResult<AudioMetadata> {
        debug!("Reading metadata from: {}", path.display());

        let modified = fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| metadata_error(path, &e))?;

        let tagged = Probe::open(path)
            .map_err(|e| metadata_error(path, &e))?
            .guess_file_type()
            .map_err(|e| metadata_error(path, &e))?
            .read()
            .map_err(|e| metadata_error(path, &e))?;

        let codec = codec_from_file_type(tagged.file_type())
            .or_else(|| Codec::from_path(path))
            .ok_or_else(|| EntryError::Metadata {
                path: path.to_path_buf(),
                reason: format!("unsupported container {:?}", tagged.file_type()),
            })?;

        let properties = tagged.properties();
        let bitrate = properties
            .audio_bitrate()
            .or_else(|| properties.overall_bitrate())
            .unwrap_or(0);

        let mut metadata = AudioMetadata::new(codec, bitrate);
        metadata.duration = properties.duration();
        metadata.modified = Some(modified);

        if let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) {
            metadata.title = tag.title().map(|s| normalize_text(&s));
            metadata.artist = tag.artist().map(|s| normalize_text(&s));
            metadata.album = tag.album().map(|s| normalize_text(&s));
            metadata.genre = tag.genre().map(|s| normalize_text(&s));
            metadata.album_artist = tag.get_string(&ItemKey::AlbumArtist).map(normalize_text);
            metadata.composer = tag.get_string(&ItemKey::Composer).map(normalize_text);
            metadata.year = tag.year().and_then(|y| i32::try_from(y).ok());
            metadata.track_number = tag.track();
            metadata.total_tracks = tag.track_total();
            metadata.disc_number = tag.disk();
            metadata.total_discs = tag.disk_total();
        }

        if codec == Codec::Mp3 {
            merge_id3_tags(path, &mut metadata);
        }

        Ok(metadata)
    }
}

/// Overlay ID3v2 frames onto metadata read by `lofty`.
///
/// A missing or unreadable ID3 tag is not an error: the generic tags stay.
fn merge_id3_tags(path: &Path, metadata: &mut AudioMetadata) {
    let tag = match Tag::read_from_path(path) {
        Ok(tag) => tag,
        Err(id3::Error {
            kind: id3::ErrorKind::NoTag,
            ..
        }) => {
            debug!("No ID3 tag found in: {}", path.display());
            return;
        }
        Err(e) => {
            warn!("Failed to read ID3 tag from {}: {}", path.display(), e);
            return;
        }
    };

    if let Some(title) = tag.title() {
        metadata.title = Some(normalize_text(title));
    }
    if let Some(artist) = tag.artist() {
        metadata.artist = Some(normalize_text(artist));
    }
    if let Some(album) = tag.album() {
        metadata.album = Some(normalize_text(album));
    }
    if let Some(album_artist) = tag.album_artist() {
        metadata.album_artist = Some(normalize_text(album_artist));
    }
    if let Some(genre) = tag.genre_parsed() {
        metadata.genre = Some(normalize_text(&genre));
    }
    if let Some(composer) = tag.get("TCOM").and_then(|frame| frame.content().text()) {
        metadata.composer = Some(normalize_text(composer));
    }
    metadata.year = tag.year().or(metadata.year);
    metadata.track_number = tag.track().or(metadata.track_number);
    metadata.total_tracks = tag.total_tracks().or(metadata.total_tracks);
    metadata.disc_number = tag.disc().or(metadata.disc_number);
    metadata.total_discs = tag.total_discs().or(metadata.total_discs);
}

const fn codec_from_file_type(file_type: FileType) -> Option<Codec> {
    match file_type {
        FileType::Mpeg => Some(Codec::Mp3),
        FileType::Flac => Some(Codec::Flac),
        FileType::Vorbis => Some(Codec::Vorbis),
        FileType::Opus => Some(Codec::Opus),
        FileType::Aac | FileType::Mp4 => Some(Codec::Aac),
        FileType::Wav => Some(Codec::Wav),
        FileType::Aiff => Some(Codec::Aiff),
        FileType::WavPack => Some(Codec::WavPack),
        FileType::Ape => Some(Codec::Ape),
        _ => None,
    }
}

/// Trim and collapse whitespace, dropping control characters.
fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .filter(|c| !c.is_control())
        .collect()
}

fn identify_error(path: &Path, e: &dyn std::fmt::Display) -> EntryError {
    EntryError::Identify {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn metadata_error(path: &Path, e: &dyn std::fmt::Display) -> EntryError {
    EntryError::Metadata {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
