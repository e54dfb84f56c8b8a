//! Immutable directory-tree snapshots.
//!
//! A [`Snapshot`] is built by walking a library root exactly once. Every node
//! is stored in a flat arena owned by the snapshot; parent and child links
//! are arena indices and the key index maps a `/`-separated relative path to
//! its node. Nothing is mutated after construction except the lazily read
//! audio metadata of music entries, which lives in a single-assignment cell.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::SystemTime;

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::codec::Codec;
use crate::error::{EntryError, Error, FileSystemError, Result};
use crate::metadata::{AudioMetadata, AudioProbe, ProbeResult};

/// Index of an entry inside its snapshot.
pub type EntryId = usize;

const ROOT: EntryId = 0;

/// Options captured when a snapshot is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotOptions {
    /// Skip dot-prefixed entries and their subtrees.
    pub ignore_hidden: bool,
    /// Resolve symbolic links while walking.
    pub follow_symlinks: bool,
    /// Order children by file name instead of directory-listing order.
    pub sorted: bool,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            ignore_hidden: true,
            follow_symlinks: true,
            sorted: false,
        }
    }
}

impl SnapshotOptions {
    /// Options with children sorted by name, for deterministic output.
    #[must_use]
    pub const fn sorted(mut self) -> Self {
        self.sorted = true;
        self
    }
}

/// Classification of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    /// A directory.
    Directory,
    /// A file that is not audio.
    PlainFile,
    /// An audio file and the codec it was identified as.
    Music(Codec),
    /// An entry that could not be read or identified.
    Error(EntryError),
}

#[derive(Debug)]
struct Node {
    key: String,
    kind: EntryKind,
    size: u64,
    modified: Option<SystemTime>,
    parent: Option<EntryId>,
    children: Vec<EntryId>,
    metadata: OnceLock<ProbeResult<AudioMetadata>>,
}

impl Node {
    fn new(key: String, kind: EntryKind, parent: Option<EntryId>) -> Self {
        Self {
            key,
            kind,
            size: 0,
            modified: None,
            parent,
            children: Vec::new(),
            metadata: OnceLock::new(),
        }
    }
}

/// A fully materialized view of one directory tree.
pub struct Snapshot {
    root: PathBuf,
    nodes: Vec<Node>,
    index: HashMap<String, EntryId>,
    probe: Arc<dyn AudioProbe>,
    options: SnapshotOptions,
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("root", &self.root)
            .field("entries", &self.nodes.len())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Snapshot {
    /// Walk `root` and build a snapshot of everything below it.
    ///
    /// Fails only when the root is missing, is not a directory, or cannot be
    /// listed. Problems with individual entries are recorded as
    /// [`EntryKind::Error`] entries instead.
    pub fn build(
        root: impl AsRef<Path>,
        options: SnapshotOptions,
        probe: Arc<dyn AudioProbe>,
    ) -> Result<Self> {
        let root = root.as_ref();
        let root_meta = match fs::metadata(root) {
            Ok(meta) => meta,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(FileSystemError::NotFound {
                    path: root.to_path_buf(),
                }
                .into());
            }
            Err(e) => return Err(Error::read(root, &e)),
        };
        if !root_meta.is_dir() {
            return Err(FileSystemError::NotADirectory {
                path: root.to_path_buf(),
            }
            .into());
        }
        let root = std::path::absolute(root).map_err(|e| Error::read(root, &e))?;

        info!("Building snapshot of {}", root.display());

        let mut root_node = Node::new(String::new(), EntryKind::Directory, None);
        root_node.modified = root_meta.modified().ok();

        let mut snapshot = Self {
            root,
            nodes: vec![root_node],
            index: HashMap::from([(String::new(), ROOT)]),
            probe,
            options,
        };
        snapshot.walk()?;
        snapshot.accumulate_sizes();

        info!(
            "Snapshot of {} holds {} entries ({} bytes)",
            snapshot.root.display(),
            snapshot.nodes.len(),
            snapshot.size()
        );
        Ok(snapshot)
    }

    fn walk(&mut self) -> Result<()> {
        let ignore_hidden = self.options.ignore_hidden;
        let mut walker = WalkDir::new(&self.root)
            .min_depth(1)
            .follow_links(self.options.follow_symlinks);
        if self.options.sorted {
            walker = walker.sort_by_file_name();
        }

        let mut entries = walker
            .into_iter()
            .filter_entry(|e| !(ignore_hidden && is_hidden(e.file_name())));

        while let Some(item) = entries.next() {
            match item {
                Ok(entry) => {
                    if entry.path_is_symlink() && !self.options.follow_symlinks {
                        debug!("Skipping symlink {}", entry.path().display());
                        continue;
                    }
                    if entry.file_name().to_str().is_none() {
                        self.add_invalid_name(&entry);
                        if entry.file_type().is_dir() {
                            entries.skip_current_dir();
                        }
                        continue;
                    }
                    self.add_entry(&entry);
                }
                Err(e) => self.add_walk_error(&e)?,
            }
        }
        Ok(())
    }

    fn add_entry(&mut self, entry: &walkdir::DirEntry) {
        let path = entry.path();
        let Some(key) = self.key_of(path) else {
            warn!("Entry outside of snapshot root: {}", path.display());
            return;
        };

        let file_type = entry.file_type();
        let meta = match entry.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                let error = EntryError::Unreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                };
                self.insert(key, EntryKind::Error(error), 0, None);
                return;
            }
        };

        let kind = if file_type.is_dir() {
            EntryKind::Directory
        } else if file_type.is_file() {
            match self.probe.identify(path) {
                Ok(Some(codec)) => EntryKind::Music(codec),
                Ok(None) => EntryKind::PlainFile,
                Err(e) => {
                    warn!("{}", e);
                    EntryKind::Error(e)
                }
            }
        } else {
            EntryKind::PlainFile
        };

        let size = if file_type.is_dir() { 0 } else { meta.len() };
        self.insert(key, kind, size, meta.modified().ok());
    }

    /// Names that are not UTF-8 have no exact key, so they are kept as error
    /// entries under their lossy key. The first one wins when two such names
    /// decode to the same key.
    fn add_invalid_name(&mut self, entry: &walkdir::DirEntry) {
        let path = entry.path();
        let Some(key) = self.lossy_key_of(path) else {
            warn!("Entry outside of snapshot root: {}", path.display());
            return;
        };
        warn!("Name of {} is not valid UTF-8", path.display());
        if self.index.contains_key(&key) {
            return;
        }
        let error = EntryError::InvalidName {
            path: path.to_path_buf(),
        };
        self.insert(key, EntryKind::Error(error), 0, None);
    }

    fn add_walk_error(&mut self, e: &walkdir::Error) -> Result<()> {
        let Some(path) = e.path() else {
            warn!("Walk error without a path: {}", e);
            return Ok(());
        };
        let Some(key) = self.lossy_key_of(path) else {
            warn!("Walk error outside of snapshot root: {}", e);
            return Ok(());
        };
        if key.is_empty() {
            let io_err = io::Error::other(e.to_string());
            return Err(Error::read(&self.root, &io_err));
        }

        warn!("{}", e);
        let error = EntryError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };

        // A directory that was recorded but whose listing then failed.
        if let Some(&id) = self.index.get(&key) {
            self.nodes[id].kind = EntryKind::Error(error);
            return Ok(());
        }
        self.insert(key, EntryKind::Error(error), 0, None);
        Ok(())
    }

    fn insert(&mut self, key: String, kind: EntryKind, size: u64, modified: Option<SystemTime>) {
        let parent = self
            .index
            .get(parent_key(&key))
            .copied()
            .unwrap_or(ROOT);
        let id = self.nodes.len();
        let mut node = Node::new(key.clone(), kind, Some(parent));
        node.size = size;
        node.modified = modified;
        self.nodes.push(node);
        self.nodes[parent].children.push(id);
        self.index.insert(key, id);
    }

    /// Children always follow their parent in the arena, so a reverse pass
    /// sees every subtree complete before its parent.
    fn accumulate_sizes(&mut self) {
        for id in (1..self.nodes.len()).rev() {
            let size = self.nodes[id].size;
            if let Some(parent) = self.nodes[id].parent {
                self.nodes[parent].size += size;
            }
        }
    }

    /// Key of a path below the root. `None` outside the root or when a
    /// component is not valid UTF-8.
    fn key_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts = rel
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()?;
        Some(parts.join("/"))
    }

    /// Display key for entries that are recorded only as errors.
    fn lossy_key_of(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect();
        Some(parts.join("/"))
    }

    /// Absolute path of the snapshot root.
    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// The root entry, always a directory.
    #[must_use]
    pub fn root(&self) -> Entry<'_> {
        Entry {
            snapshot: self,
            id: ROOT,
        }
    }

    /// Look up an entry by its relative key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Entry<'_>> {
        self.index.get(key).map(|&id| Entry { snapshot: self, id })
    }

    /// Absolute path for a relative key, whether or not it exists.
    #[must_use]
    pub fn path(&self, key: &str) -> PathBuf {
        if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(key)
        }
    }

    /// Total size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.nodes[ROOT].size
    }

    /// Number of entries, including the root.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the snapshot holds only its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Options the snapshot was built with.
    #[must_use]
    pub const fn options(&self) -> SnapshotOptions {
        self.options
    }

    /// All entries in depth-first pre-order, starting with the root.
    pub fn iter(&self) -> impl Iterator<Item = Entry<'_>> {
        (0..self.nodes.len()).map(|id| Entry { snapshot: self, id })
    }
}

/// A borrowed handle to one entry of a [`Snapshot`].
#[derive(Clone, Copy)]
pub struct Entry<'a> {
    snapshot: &'a Snapshot,
    id: EntryId,
}

impl std::fmt::Debug for Entry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entry")
            .field("key", &self.node().key)
            .field("kind", &self.node().kind)
            .field("size", &self.node().size)
            .finish()
    }
}

impl<'a> Entry<'a> {
    fn node(&self) -> &'a Node {
        &self.snapshot.nodes[self.id]
    }

    /// Arena index of this entry.
    #[must_use]
    pub const fn id(&self) -> EntryId {
        self.id
    }

    /// Path relative to the snapshot root, `/`-separated; empty for the root.
    #[must_use]
    pub fn key(&self) -> &'a str {
        &self.node().key
    }

    /// Final component of the key.
    #[must_use]
    pub fn file_name(&self) -> &'a str {
        let key = self.key();
        key.rsplit_once('/').map_or(key, |(_, name)| name)
    }

    /// Classification of this entry.
    #[must_use]
    pub fn kind(&self) -> &'a EntryKind {
        &self.node().kind
    }

    /// Whether this entry is a directory.
    #[must_use]
    pub fn is_dir(&self) -> bool {
        matches!(self.node().kind, EntryKind::Directory)
    }

    /// Whether this entry was identified as audio.
    #[must_use]
    pub fn is_music(&self) -> bool {
        matches!(self.node().kind, EntryKind::Music(_))
    }

    /// Codec of a music entry.
    #[must_use]
    pub fn codec(&self) -> Option<Codec> {
        match self.node().kind {
            EntryKind::Music(codec) => Some(codec),
            _ => None,
        }
    }

    /// Error recorded on an error entry.
    #[must_use]
    pub fn error(&self) -> Option<&'a EntryError> {
        match &self.node().kind {
            EntryKind::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Own size for files, sum of children for directories.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.node().size
    }

    /// Modification time, if it could be read.
    #[must_use]
    pub fn modified(&self) -> Option<SystemTime> {
        self.node().modified
    }

    /// Parent directory; `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        self.node().parent.map(|id| Self {
            snapshot: self.snapshot,
            id,
        })
    }

    /// Children in walk order.
    pub fn children(&self) -> impl Iterator<Item = Entry<'a>> + 'a {
        let snapshot = self.snapshot;
        self.node()
            .children
            .iter()
            .map(move |&id| Entry { snapshot, id })
    }

    /// Absolute path of this entry.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        match &self.node().kind {
            EntryKind::Error(EntryError::InvalidName { path }) => path.clone(),
            _ => self.snapshot.path(self.key()),
        }
    }

    /// Audio metadata of a music entry.
    ///
    /// Read on first access and cached, failures included.
    pub fn metadata(&self) -> ProbeResult<&'a AudioMetadata> {
        let node = self.node();
        match &node.kind {
            EntryKind::Music(_) => node
                .metadata
                .get_or_init(|| self.snapshot.probe.read_metadata(&self.path()))
                .as_ref()
                .map_err(Clone::clone),
            EntryKind::Error(e) => Err(e.clone()),
            EntryKind::Directory | EntryKind::PlainFile => Err(EntryError::Metadata {
                path: self.path(),
                reason: "not an audio file".to_string(),
            }),
        }
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().is_some_and(|s| s.starts_with('.'))
}

fn parent_key(key: &str) -> &str {
    key.rsplit_once('/').map_or("", |(parent, _)| parent)
}
