//! Audio codecs known to the mirror.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// An audio encoding recognised by the classification gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// MPEG-1/2 Audio Layer III.
    Mp3,
    /// Free Lossless Audio Codec.
    Flac,
    /// Ogg Vorbis.
    Vorbis,
    /// Opus.
    Opus,
    /// AAC, usually in an MP4 container.
    Aac,
    /// RIFF WAVE.
    Wav,
    /// Audio Interchange File Format.
    Aiff,
    /// WavPack.
    WavPack,
    /// Monkey's Audio.
    Ape,
}

/// Known audio file extensions and the codec they usually hold.
const EXTENSIONS: &[(&str, Codec)] = &[
    ("mp3", Codec::Mp3),
    ("flac", Codec::Flac),
    ("ogg", Codec::Vorbis),
    ("oga", Codec::Vorbis),
    ("opus", Codec::Opus),
    ("m4a", Codec::Aac),
    ("aac", Codec::Aac),
    ("mp4", Codec::Aac),
    ("wav", Codec::Wav),
    ("aif", Codec::Aiff),
    ("aiff", Codec::Aiff),
    ("wv", Codec::WavPack),
    ("ape", Codec::Ape),
];

impl Codec {
    /// Canonical file extension, including the leading dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => ".mp3",
            Self::Flac => ".flac",
            Self::Vorbis => ".ogg",
            Self::Opus => ".opus",
            Self::Aac => ".m4a",
            Self::Wav => ".wav",
            Self::Aiff => ".aiff",
            Self::WavPack => ".wv",
            Self::Ape => ".ape",
        }
    }

    /// Whether the codec preserves the original signal exactly.
    #[must_use]
    pub const fn is_lossless(self) -> bool {
        matches!(
            self,
            Self::Flac | Self::Wav | Self::Aiff | Self::WavPack | Self::Ape
        )
    }

    /// Guess the codec from a path's extension (case-insensitive).
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        EXTENSIONS
            .iter()
            .find(|(candidate, _)| *candidate == ext)
            .map(|(_, codec)| *codec)
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mp3 => write!(f, "MP3"),
            Self::Flac => write!(f, "FLAC"),
            Self::Vorbis => write!(f, "Vorbis"),
            Self::Opus => write!(f, "Opus"),
            Self::Aac => write!(f, "AAC"),
            Self::Wav => write!(f, "WAV"),
            Self::Aiff => write!(f, "AIFF"),
            Self::WavPack => write!(f, "WavPack"),
            Self::Ape => write!(f, "APE"),
        }
    }
}
