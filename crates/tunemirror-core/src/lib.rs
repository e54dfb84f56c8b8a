//! `Tunemirror` Core Library
//!
//! This crate keeps a portable, lossy mirror of a high-quality music library:
//! - Library snapshots with lazily probed audio metadata
//! - Per-file decisions (copy, encode, update, skip) driven by an encoder
//! - A two-tree planner that brings a destination in line with a source
//! - A bounded worker pool for external encoder processes
//! - Library statistics and tree listings
//! - Persistent configuration
//!
//! # Error Handling
//!
//! Every fallible operation returns [`Result`]. Errors concerning a single
//! library entry are routed through an [`Operator`]'s `warn` hook, which
//! decides whether the run goes on. See the [`error`] module for details.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tunemirror_core::{
//!     DryRunner, LoftyProbe, Planner, Policy, Reporter, Snapshot, SnapshotOptions,
//! };
//!
//! let probe = Arc::new(LoftyProbe::new());
//! let src = Snapshot::build("/music/flac".as_ref(), SnapshotOptions::default(), probe.clone())?;
//! let dst = Snapshot::build("/music/mp3".as_ref(), SnapshotOptions::default(), probe)?;
//! let op = Arc::new(DryRunner::new(Policy::default(), Arc::new(Reporter::stdio())));
//! let summary = Planner::new(&src, &dst, op).plan()?;
//! ```

pub mod codec;
pub mod config;
pub mod encoder;
pub mod error;
pub mod metadata;
pub mod operator;
pub mod planner;
pub mod policy;
pub mod pool;
pub mod snapshot;
pub mod stats;

pub use codec::Codec;
pub use config::{MirrorConfig, TargetFormat};
pub use encoder::{
    DEFAULT_BITRATE_THRESHOLD, DEFAULT_QUALITY, DEFAULT_TARGET_BITRATE, Encoder, LossyEncoder,
    Mp3Encoder,
};
pub use error::{
    EntryError, Error, ErrorKind, ExecError, FileSystemError, PlanError, Result,
};
pub use metadata::{AudioMetadata, AudioProbe, LoftyProbe, ProbeResult};
pub use operator::{DryRunner, Operator, Reporter, Runner};
pub use planner::{PlanOptions, PlanSummary, Planner, destination_key};
pub use policy::{AudioOperation, Policy};
pub use pool::{PoolConfig, PoolReport, WorkerPool, default_concurrency};
pub use snapshot::{Entry, EntryId, EntryKind, Snapshot, SnapshotOptions};
pub use stats::{LibraryStats, format_bytes, format_duration, render_tree};
