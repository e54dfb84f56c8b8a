//! Library statistics and tree listings.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::snapshot::{Entry, EntryKind, Snapshot};

/// Aggregate figures about a library snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    /// Size of everything in the library.
    pub total_bytes: u64,
    /// Size of all music files.
    pub music_bytes: u64,
    /// Summed play time of readable music files.
    pub play_time: Duration,
    /// Music files whose metadata could be read.
    pub songs: usize,
    /// Music files whose metadata could not be read.
    pub unreadable: usize,
    /// Distinct artists.
    pub artists: BTreeSet<String>,
    /// Distinct albums.
    pub albums: BTreeSet<String>,
    /// Distinct album artists.
    pub album_artists: BTreeSet<String>,
    /// Distinct genres.
    pub genres: BTreeSet<String>,
    /// Distinct composers.
    pub composers: BTreeSet<String>,
}

impl LibraryStats {
    /// Gather statistics, reading the metadata of every music file.
    #[must_use]
    pub fn collect(snapshot: &Snapshot) -> Self {
        let mut stats = Self {
            total_bytes: snapshot.size(),
            ..Self::default()
        };

        for entry in snapshot.iter().filter(Entry::is_music) {
            stats.music_bytes += entry.size();
            let md = match entry.metadata() {
                Ok(md) => md,
                Err(e) => {
                    warn!("{}", e);
                    stats.unreadable += 1;
                    continue;
                }
            };

            stats.songs += 1;
            stats.play_time += md.duration;
            add_split(&mut stats.artists, md.artist.as_deref());
            add_split(&mut stats.albums, md.album.as_deref());
            add_split(&mut stats.album_artists, md.album_artist.as_deref());
            add_split(&mut stats.genres, md.genre.as_deref());
            add_split(&mut stats.composers, md.composer.as_deref());
        }
        stats
    }

    /// Human-readable report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("Standard stats:\n");
        let rows = [
            ("Total size", format_bytes(self.total_bytes)),
            ("Music size", format_bytes(self.music_bytes)),
            ("Play time", format_duration(self.play_time)),
            ("Songs", self.songs.to_string()),
            ("Unreadable", self.unreadable.to_string()),
            ("Artists", self.artists.len().to_string()),
            ("Albums", self.albums.len().to_string()),
            ("Album artists", self.album_artists.len().to_string()),
            ("Genres", self.genres.len().to_string()),
            ("Composers", self.composers.len().to_string()),
        ];
        for (label, value) in rows {
            let _ = writeln!(out, "  {label:<14}{value}");
        }
        out
    }
}

/// Multi-valued tags separate values with `/`.
fn add_split(set: &mut BTreeSet<String>, value: Option<&str>) {
    let Some(value) = value else {
        return;
    };
    for part in value.split('/').map(str::trim).filter(|p| !p.is_empty()) {
        set.insert(part.to_string());
    }
}

/// Indented listing of a snapshot; directories end in `/`, unreadable
/// entries are marked with `!`.
#[must_use]
pub fn render_tree(snapshot: &Snapshot) -> String {
    let mut out = String::from("Tree:\n");
    render_entry(&mut out, snapshot.root(), 0);
    out
}

fn render_entry(out: &mut String, entry: Entry<'_>, level: usize) {
    let indent = "  ".repeat(level);
    let name = if level == 0 {
        "."
    } else {
        entry.file_name()
    };
    match entry.kind() {
        EntryKind::Directory => {
            let _ = writeln!(out, "{indent}{name}/");
            for child in entry.children() {
                render_entry(out, child, level + 1);
            }
        }
        EntryKind::PlainFile | EntryKind::Music(_) => {
            let _ = writeln!(out, "{indent}{name}");
        }
        EntryKind::Error(_) => {
            let _ = writeln!(out, "{indent}{name} !");
        }
    }
}

/// Format bytes to human-readable string.
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Format a play time as H:MM:SS.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codec;
    use crate::error::EntryError;
    use crate::metadata::{AudioMetadata, MockAudioProbe};
    use crate::snapshot::SnapshotOptions;
    use std::fs;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn tagged_probe() -> MockAudioProbe {
        let mut probe = MockAudioProbe::new();
        probe
            .expect_identify()
            .returning(|path| Ok(Codec::from_path(path)));
        probe.expect_read_metadata().returning(|path| {
            if path.ends_with("broken.flac") {
                return Err(EntryError::Metadata {
                    path: path.to_path_buf(),
                    reason: "bad header".to_string(),
                });
            }
            let mut md = AudioMetadata::new(Codec::Flac, 900);
            md.duration = Duration::from_secs(100);
            md.artist = Some("Alice/Bob".to_string());
            md.album = Some("First".to_string());
            md.genre = Some("Jazz".to_string());
            Ok(md)
        });
        probe
    }

    fn library() -> (TempDir, Snapshot) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let root = temp_dir.path();
        fs::create_dir_all(root.join("album")).expect("dirs");
        fs::write(root.join("album/01.flac"), vec![0u8; 10]).expect("write");
        fs::write(root.join("album/02.flac"), vec![0u8; 10]).expect("write");
        fs::write(root.join("album/broken.flac"), vec![0u8; 10]).expect("write");
        fs::write(root.join("album/cover.jpg"), vec![0u8; 4]).expect("write");

        let snapshot = Snapshot::build(
            root,
            SnapshotOptions::default().sorted(),
            Arc::new(tagged_probe()),
        )
        .expect("build");
        (temp_dir, snapshot)
    }

    #[test]
    fn test_collect() {
        let (_dir, snapshot) = library();
        let stats = LibraryStats::collect(&snapshot);

        assert_eq!(stats.total_bytes, 34);
        assert_eq!(stats.music_bytes, 30);
        assert_eq!(stats.songs, 2);
        assert_eq!(stats.unreadable, 1);
        assert_eq!(stats.play_time, Duration::from_secs(200));
        assert_eq!(stats.artists.len(), 2);
        assert_eq!(stats.albums.len(), 1);
        assert!(stats.composers.is_empty());
        assert!(stats.render().contains("Songs         2"));
    }

    #[test]
    fn test_render_tree() {
        let (_dir, snapshot) = library();
        assert_eq!(
            render_tree(&snapshot),
            "Tree:\n./\n  album/\n    01.flac\n    02.flac\n    broken.flac\n    cover.jpg\n"
        );
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }
}
