//! # rigscope
//!
//! Live, typed views of a remote process's instance tree.
//!
//! This crate provides:
//! - A best-effort memory accessor over injected read/write primitives
//! - Process attach on Windows and Linux
//! - Instance references with name, class and child traversal
//! - Class-checked archetype views (parts, humanoids, players, cameras)
//! - Per-tick entity snapshots of player rigs and a tracker that diffs them
//!
//! Reads never fail: an unmapped or vanished address reads as zero, an
//! empty string or a null reference. Only attach and root resolution return
//! errors.

pub mod entity;
pub mod error;
pub mod instance;
pub mod math;
pub mod memory;
pub mod offset;
pub mod prelude;
pub mod tracker;

pub use entity::{
    ActiveRig, CachedEntity, R6Part, R6Parts, R15Part, R15Parts, Snapshot, SnapshotBuilder,
    SnapshotDiff, ToolInfo,
};
pub use error::{Error, Result};
pub use instance::{Archetype, Instance, InstanceId, RigKind, Remote};
pub use math::{Matrix3, Vector3};
pub use memory::{MemoryAccess, MemoryReader, ProcessHandle, Readout, StringLayout};
pub use offset::{OffsetTable, load_offsets, save_offsets};
pub use tracker::{Roots, Tracker, TrackerConfig, TrackerConfigBuilder, resolve_roots};
