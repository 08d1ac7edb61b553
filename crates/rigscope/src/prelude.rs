//! Prelude module for convenient imports
//!
//! ```ignore
//! use rigscope::prelude::*;
//! ```

// Memory access
pub use crate::memory::{MemoryAccess, MemoryReader, ProcessHandle, StringLayout};

// Instance tree and archetype views
pub use crate::instance::{
    Archetype, BasePart, Camera, DataModel, Humanoid, Instance, InstanceId, Model, Player,
    Players, Remote, RigKind, Team, Tool, Workspace,
};

// Snapshots
pub use crate::entity::{CachedEntity, Snapshot, SnapshotBuilder, SnapshotDiff};
pub use crate::tracker::{Tracker, TrackerConfig};

// Configuration and errors
pub use crate::error::{Error, Result};
pub use crate::offset::OffsetTable;
