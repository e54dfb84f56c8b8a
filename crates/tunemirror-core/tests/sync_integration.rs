//! Integration tests for `Tunemirror` sync workflows.
//!
//! These tests drive the planner end to end over temporary directories:
//! - Fresh mirrors and idempotent re-runs
//! - Type mismatches and unexpected destination entries
//! - Destination collisions and escalated warnings
//! - Aborting while siblings are still being planned
//! - Dry-run reporting
//!
//! No external encoder is needed: the recording operator "encodes" by
//! writing a marker file.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use filetime::FileTime;
use tempfile::TempDir;
use tunemirror_core::{
    AudioMetadata, AudioProbe, Codec, DryRunner, Encoder, EntryError, Error, ErrorKind,
    Mp3Encoder, Operator, PlanError, PlanOptions, PlanSummary, Planner, Policy, ProbeResult,
    Reporter, Snapshot, SnapshotOptions,
};

// =============================================================================
// Test Fixtures and Utilities
// =============================================================================

/// Identifies files by extension. MP3 files hold their bitrate as text;
/// files named `broken.*` cannot be read.
#[derive(Debug, Default)]
struct FakeProbe;

impl AudioProbe for FakeProbe {
    fn identify(&self, path: &Path) -> ProbeResult<Option<Codec>> {
        Ok(Codec::from_path(path))
    }

    fn read_metadata(&self, path: &Path) -> ProbeResult<AudioMetadata> {
        if path.file_stem().is_some_and(|s| s == "broken") {
            return Err(EntryError::Metadata {
                path: path.to_path_buf(),
                reason: "truncated header".to_string(),
            });
        }
        let codec = Codec::from_path(path).ok_or_else(|| EntryError::Metadata {
            path: path.to_path_buf(),
            reason: "not audio".to_string(),
        })?;
        let bitrate = fs::read_to_string(path)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(900);
        Ok(AudioMetadata::new(codec, bitrate))
    }
}

/// Operator that performs filesystem actions for real, fakes encodes and
/// records every call relative to the destination root.
struct RecordingOperator {
    policy: Policy,
    root: PathBuf,
    escalate: bool,
    hold_copies: bool,
    log: Mutex<Vec<String>>,
    warnings: Mutex<Vec<String>>,
}

impl RecordingOperator {
    fn new(root: &Path) -> Self {
        Self {
            policy: Policy::new(Encoder::Mp3(Mp3Encoder::default())),
            root: root.to_path_buf(),
            escalate: false,
            hold_copies: false,
            log: Mutex::new(Vec::new()),
            warnings: Mutex::new(Vec::new()),
        }
    }

    fn escalating(mut self) -> Self {
        self.escalate = true;
        self
    }

    /// Copies wait until a warning has been reported, and are slowed down
    /// afterwards, so that planning is still running when an encode fails.
    fn holding_copies(mut self) -> Self {
        self.hold_copies = true;
        self
    }

    fn record(&self, action: &str, path: &Path) {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        self.log
            .lock()
            .expect("log lock")
            .push(format!("{action} {}", rel.display()));
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().expect("log lock").clone()
    }

    fn sorted_log(&self) -> Vec<String> {
        let mut log = self.log();
        log.sort();
        log
    }

    fn warnings(&self) -> Vec<String> {
        self.warnings.lock().expect("warnings lock").clone()
    }

    fn encode(&self, src: &Path, dst: &Path) -> tunemirror_core::Result<()> {
        if src.file_stem().is_some_and(|s| s == "fail") {
            return Err(Error::Internal(format!("encoder crashed on {}", src.display())));
        }
        fs::write(dst, format!("encoded from {}", src.display()))?;
        Ok(())
    }
}

impl Operator for RecordingOperator {
    fn policy(&self) -> &Policy {
        &self.policy
    }

    fn ok(&self, dst: &Path) -> tunemirror_core::Result<()> {
        self.record("ok", dst);
        Ok(())
    }

    fn ignore(&self, dst: &Path) -> tunemirror_core::Result<()> {
        self.record("ignore", dst);
        Ok(())
    }

    fn warn(&self, err: Error) -> tunemirror_core::Result<()> {
        self.warnings
            .lock()
            .expect("warnings lock")
            .push(err.to_string());
        if self.escalate {
            return Err(err);
        }
        Ok(())
    }

    fn error(&self, err: Error) -> tunemirror_core::Result<()> {
        Err(err)
    }

    fn create_dir(&self, dst: &Path) -> tunemirror_core::Result<()> {
        self.record("mkdir", dst);
        fs::create_dir_all(dst)?;
        Ok(())
    }

    fn remove_dir(&self, dst: &Path) -> tunemirror_core::Result<()> {
        self.record("rmdir", dst);
        fs::remove_dir_all(dst)?;
        Ok(())
    }

    fn remove_file(&self, dst: &Path) -> tunemirror_core::Result<()> {
        self.record("rm", dst);
        fs::remove_file(dst)?;
        Ok(())
    }

    fn copy_file(&self, src: &Path, dst: &Path) -> tunemirror_core::Result<()> {
        if self.hold_copies {
            let deadline = Instant::now() + Duration::from_secs(10);
            while self.warnings().is_empty() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(1));
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        self.record("cp", dst);
        fs::copy(src, dst)?;
        Ok(())
    }

    fn transcode(
        &self,
        src: &Path,
        dst: &Path,
        _metadata: &AudioMetadata,
    ) -> tunemirror_core::Result<()> {
        self.record("encode", dst);
        self.encode(src, dst)
    }

    fn update(
        &self,
        src: &Path,
        dst: &Path,
        _metadata: &AudioMetadata,
    ) -> tunemirror_core::Result<()> {
        self.record("update", dst);
        self.encode(src, dst)
    }
}

/// A source and a destination library in temporary directories.
struct Libraries {
    src: TempDir,
    dst: TempDir,
}

impl Libraries {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init();

        Self {
            src: TempDir::new().expect("Failed to create source dir"),
            dst: TempDir::new().expect("Failed to create destination dir"),
        }
    }

    /// Create files in the source with an mtime well in the past.
    fn add_source(&self, files: &[(&str, &str)]) {
        write_files(self.src.path(), files);
        let past = FileTime::from_unix_time(1_600_000_000, 0);
        for (name, _) in files {
            filetime::set_file_mtime(self.src.path().join(name), past).expect("set mtime");
        }
    }

    fn add_destination(&self, files: &[(&str, &str)]) {
        write_files(self.dst.path(), files);
    }

    fn snapshots(&self) -> (Snapshot, Snapshot) {
        let probe: Arc<dyn AudioProbe> = Arc::new(FakeProbe);
        let options = SnapshotOptions::default().sorted();
        let src = Snapshot::build(self.src.path(), options, Arc::clone(&probe)).expect("src");
        let dst = Snapshot::build(self.dst.path(), options, probe).expect("dst");
        (src, dst)
    }

    fn operator(&self) -> RecordingOperator {
        let root = std::path::absolute(self.dst.path()).expect("absolute");
        RecordingOperator::new(&root)
    }

    fn sync(
        &self,
        op: &Arc<RecordingOperator>,
        options: PlanOptions,
    ) -> tunemirror_core::Result<PlanSummary> {
        let (src, dst) = self.snapshots();
        let dyn_op: Arc<dyn Operator> = Arc::clone(op) as Arc<dyn Operator>;
        Planner::new(&src, &dst, dyn_op).with_options(options).plan()
    }

    fn dst(&self, key: &str) -> PathBuf {
        self.dst.path().join(key)
    }
}

fn write_files(root: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        if name.ends_with('/') {
            fs::create_dir_all(&path).expect("create dir");
        } else {
            fs::write(&path, content).expect("write file");
        }
    }
}

fn options() -> PlanOptions {
    PlanOptions {
        concurrency: 2,
        ..PlanOptions::default()
    }
}

/// Writer that keeps everything in a shared buffer.
#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().expect("buffer lock").clone()).expect("utf8")
    }
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("buffer lock").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

// =============================================================================
// Mirror Workflow Integration Tests
// =============================================================================

#[test]
fn test_fresh_mirror_then_rerun_is_idempotent() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless"), ("b.mp3", "128"), ("sub/c.txt", "notes")]);

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("first sync");

    assert_eq!(
        op.sorted_log(),
        vec!["cp b.mp3", "cp sub/c.txt", "encode a.mp3", "mkdir sub"]
    );
    assert_eq!(summary.transcoded, 1);
    assert_eq!(summary.copied, 2);
    assert_eq!(summary.dirs_created, 1);
    assert_eq!(summary.failed_jobs, 0);

    assert!(
        fs::read_to_string(libs.dst("a.mp3"))
            .expect("encoded file")
            .starts_with("encoded from")
    );
    assert_eq!(fs::read_to_string(libs.dst("b.mp3")).expect("copy"), "128");
    assert_eq!(fs::read_to_string(libs.dst("sub/c.txt")).expect("copy"), "notes");

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("second sync");
    assert_eq!(summary.writes(), 0);
    assert_eq!(summary.ok, 3);
    assert_eq!(op.sorted_log(), vec!["ok a.mp3", "ok b.mp3", "ok sub/c.txt"]);
}

#[test]
fn test_high_bitrate_mp3_is_reencoded() {
    let libs = Libraries::new();
    libs.add_source(&[("low.mp3", "256"), ("high.mp3", "320")]);

    let op = Arc::new(libs.operator());
    libs.sync(&op, options()).expect("sync");

    assert_eq!(op.sorted_log(), vec!["cp low.mp3", "encode high.mp3"]);
}

#[test]
fn test_stale_destination_is_updated() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless")]);
    libs.add_destination(&[("a.mp3", "old encode")]);
    filetime::set_file_mtime(libs.dst("a.mp3"), FileTime::from_unix_time(1_500_000_000, 0))
        .expect("set mtime");

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("sync");

    assert_eq!(op.log(), vec!["update a.mp3"]);
    assert_eq!(summary.updated, 1);
}

#[test]
fn test_type_mismatch_is_removed_before_encoding() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless")]);
    libs.add_destination(&[("a.mp3/inner.txt", "in the way")]);

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("sync");

    assert_eq!(op.log(), vec!["rmdir a.mp3", "encode a.mp3"]);
    assert_eq!(summary.removed, 1);
    assert!(libs.dst("a.mp3").is_file());
}

#[test]
fn test_directory_replacing_music_destination() {
    let libs = Libraries::new();
    libs.add_source(&[("cover.mp3/", "")]);
    libs.add_destination(&[("cover.mp3", "192")]);

    let op = Arc::new(libs.operator());
    libs.sync(&op, options()).expect("sync");

    assert_eq!(op.log(), vec!["rm cover.mp3", "mkdir cover.mp3"]);
    assert!(libs.dst("cover.mp3").is_dir());
}

#[test]
fn test_unexpected_entries_kept_without_delete_before() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless")]);
    libs.add_destination(&[("extra.mp3", "128"), ("old/x.txt", "x")]);

    let op = Arc::new(libs.operator());
    libs.sync(&op, options()).expect("sync");

    assert_eq!(op.log(), vec!["encode a.mp3"]);
    assert!(libs.dst("extra.mp3").exists());
    assert!(libs.dst("old/x.txt").exists());
}

#[test]
fn test_delete_before_removes_unexpected_entries() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless"), ("keep/b.txt", "b")]);
    libs.add_destination(&[
        ("extra.mp3", "128"),
        ("old/x.txt", "x"),
        ("keep/stale.txt", "s"),
    ]);

    let op = Arc::new(libs.operator());
    let summary = libs
        .sync(
            &op,
            PlanOptions {
                delete_before: true,
                ..options()
            },
        )
        .expect("sync");

    assert_eq!(summary.removed, 3);
    let log = op.log();
    let position = |line: &str| log.iter().position(|l| l == line).expect(line);
    assert!(position("rm extra.mp3") < position("encode a.mp3"));
    assert!(position("rmdir old") < position("encode a.mp3"));
    assert!(position("rm keep/stale.txt") < position("cp keep/b.txt"));

    assert!(!libs.dst("extra.mp3").exists());
    assert!(!libs.dst("old").exists());
    assert!(!libs.dst("keep/stale.txt").exists());
    assert!(libs.dst("keep/b.txt").exists());
}

#[test]
fn test_ignored_files() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless"), ("Thumbs.db", "x"), ("notes.txt", "n")]);

    let op = Arc::new(libs.operator());
    let summary = libs
        .sync(
            &op,
            PlanOptions {
                ignore_files: HashSet::from(["Thumbs.db".to_string()]),
                ..options()
            },
        )
        .expect("sync");
    assert_eq!(summary.ignored, 1);
    assert!(op.log().contains(&"ignore Thumbs.db".to_string()));
    assert!(libs.dst("notes.txt").exists());

    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless"), ("notes.txt", "n")]);
    let op = Arc::new(libs.operator());
    libs.sync(
        &op,
        PlanOptions {
            ignore_data: true,
            ..options()
        },
    )
    .expect("sync");
    assert_eq!(op.sorted_log(), vec!["encode a.mp3", "ignore notes.txt"]);
}

#[test]
fn test_hidden_files_are_not_mirrored() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless"), (".DS_Store", "x"), (".cache/b.flac", "x")]);

    let op = Arc::new(libs.operator());
    libs.sync(&op, options()).expect("sync");

    assert_eq!(op.log(), vec!["encode a.mp3"]);
}

// =============================================================================
// Warning and Escalation Tests
// =============================================================================

#[test]
fn test_destination_collision_is_warned() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless"), ("a.wav", "lossless")]);

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("sync");

    assert_eq!(op.log(), vec!["encode a.mp3"]);
    assert_eq!(summary.warnings, 1);
    let warnings = op.warnings();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("a.wav"));
    assert!(fs::read_to_string(libs.dst("a.mp3")).expect("encoded").contains("a.flac"));
}

#[test]
fn test_unsupported_codec_does_not_claim_destination() {
    let libs = Libraries::new();
    libs.add_source(&[("a.m4a", "128"), ("a.wav", "lossless")]);

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("sync");

    assert_eq!(op.sorted_log(), vec!["encode a.mp3", "ignore a.mp3"]);
    assert!(op.warnings().is_empty());
    assert_eq!(summary.ignored, 1);
    assert_eq!(summary.transcoded, 1);
    assert!(fs::read_to_string(libs.dst("a.mp3")).expect("encoded").contains("a.wav"));
}

#[test]
fn test_delete_before_removes_output_of_unsupported_codec() {
    let libs = Libraries::new();
    libs.add_source(&[("b.m4a", "128")]);
    libs.add_destination(&[("b.mp3", "128")]);

    let op = Arc::new(libs.operator());
    libs.sync(
        &op,
        PlanOptions {
            delete_before: true,
            ..options()
        },
    )
    .expect("sync");

    assert_eq!(op.log(), vec!["rm b.mp3", "ignore b.mp3"]);
    assert!(!libs.dst("b.mp3").exists());
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_name_is_warned_not_copied() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let libs = Libraries::new();
    libs.add_source(&[("plain.txt", "ok")]);
    fs::write(libs.src.path().join(OsStr::from_bytes(b"caf\xe9.txt")), "x").expect("write");

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("sync");

    assert_eq!(op.log(), vec!["cp plain.txt"]);
    assert_eq!(summary.copied, 1);
    assert_eq!(summary.warnings, 1);
    assert!(op.warnings()[0].contains("not valid UTF-8"));
}

#[test]
fn test_unreadable_metadata_is_a_warning() {
    let libs = Libraries::new();
    libs.add_source(&[("broken.flac", "?"), ("good.flac", "lossless")]);

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("sync");

    assert_eq!(op.log(), vec!["encode good.mp3"]);
    assert_eq!(summary.warnings, 1);
    assert!(op.warnings()[0].contains("broken.flac"));
}

#[test]
fn test_escalated_warning_stops_planning() {
    let libs = Libraries::new();
    libs.add_source(&[("broken.flac", "?"), ("good.flac", "lossless")]);

    let op = Arc::new(libs.operator().escalating());
    let err = libs.sync(&op, options()).expect_err("sync should stop");

    assert_eq!(err.kind(), ErrorKind::Entry);
    assert!(op.log().is_empty());
    assert!(!libs.dst("good.mp3").exists());
}

#[test]
fn test_failed_encode_is_reported() {
    let libs = Libraries::new();
    libs.add_source(&[("fail.flac", "lossless"), ("good.flac", "lossless")]);

    let op = Arc::new(libs.operator());
    let summary = libs.sync(&op, options()).expect("sync");

    assert_eq!(summary.transcoded, 2);
    assert_eq!(summary.failed_jobs, 1);
    assert_eq!(op.warnings().len(), 1);
    assert!(op.warnings()[0].contains("encoder crashed"));
    assert!(libs.dst("good.mp3").exists());
}

#[test]
fn test_failed_encode_escalates() {
    let libs = Libraries::new();
    libs.add_source(&[("fail.flac", "lossless")]);

    let op = Arc::new(libs.operator().escalating());
    let err = libs.sync(&op, options()).expect_err("sync should stop");

    assert!(matches!(err, Error::Internal(_)));
}

#[test]
fn test_failed_encode_stops_sibling_dispatch() {
    const SIBLINGS: usize = 200;

    let libs = Libraries::new();
    let names: Vec<String> = (0..SIBLINGS).map(|i| format!("s{i:03}.txt")).collect();
    let mut files: Vec<(&str, &str)> = names.iter().map(|n| (n.as_str(), "x")).collect();
    files.push(("fail.flac", "lossless"));
    libs.add_source(&files);

    let op = Arc::new(libs.operator().escalating().holding_copies());
    let err = libs
        .sync(
            &op,
            PlanOptions {
                concurrency: 1,
                ..PlanOptions::default()
            },
        )
        .expect_err("sync should stop");

    assert!(matches!(err, Error::Internal(ref msg) if msg.contains("encoder crashed")));
    let log = op.log();
    assert_eq!(log[0], "encode fail.mp3");
    let copies = log.iter().filter(|l| l.starts_with("cp ")).count();
    assert!(copies < SIBLINGS, "all {copies} siblings were dispatched");
    assert_eq!(op.warnings().len(), 1);
}

#[test]
fn test_missing_roots_are_rejected() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let missing = dir.path().join("nope");
    let result = Snapshot::build(&missing, SnapshotOptions::default(), Arc::new(FakeProbe));
    assert!(matches!(result, Err(ref e) if e.kind() == ErrorKind::Setup));

    fs::write(dir.path().join("file"), "x").expect("write");
    let result = Snapshot::build(
        dir.path().join("file"),
        SnapshotOptions::default(),
        Arc::new(FakeProbe),
    );
    assert!(matches!(result, Err(ref e) if e.kind() == ErrorKind::Setup));
}

#[test]
fn test_collision_error_message() {
    let err: Error = PlanError::DestinationCollision {
        key: "a.mp3".to_string(),
        first: "a.flac".to_string(),
        second: "a.wav".to_string(),
    }
    .into();
    let text = err.to_string();
    assert!(text.contains("a.mp3"));
    assert!(text.contains("a.flac"));
    assert!(text.contains("a.wav"));
}

// =============================================================================
// Dry Run Tests
// =============================================================================

#[test]
fn test_dry_run_reports_without_writing() {
    let libs = Libraries::new();
    libs.add_source(&[("a.flac", "lossless"), ("b.mp3", "128"), ("sub/c.txt", "notes")]);
    libs.add_destination(&[("a.mp3/inner.txt", "in the way")]);

    let out = SharedBuf::default();
    let err = SharedBuf::default();
    let dst_root = std::path::absolute(libs.dst.path()).expect("absolute");
    let reporter = Reporter::new(out.clone(), err.clone()).strip_prefix(&dst_root);
    let op: Arc<dyn Operator> = Arc::new(DryRunner::new(
        Policy::new(Encoder::Mp3(Mp3Encoder::default())),
        Arc::new(reporter),
    ));

    let (src, dst) = libs.snapshots();
    let summary = Planner::new(&src, &dst, op)
        .with_options(options())
        .plan()
        .expect("dry run");

    let mut lines: Vec<String> = out.text().lines().map(str::to_string).collect();
    lines.sort();
    assert_eq!(
        lines,
        vec![
            "cp:       b.mp3",
            "cp:       sub/c.txt",
            "encode:   a.mp3",
            "mkdir:    sub",
            "rm -r:    a.mp3",
        ]
    );
    assert!(err.text().is_empty());
    assert_eq!(summary.writes(), 5);

    assert!(libs.dst("a.mp3").is_dir());
    assert!(!libs.dst("b.mp3").exists());
    assert!(!libs.dst("sub").exists());
}
