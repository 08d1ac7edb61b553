//! Per-tick tracking of every player character in the remote scene.
//!
//! The [`Tracker`] resolves the scene roots from the module base on every
//! tick, builds a fresh [`Snapshot`] and reports what changed against the
//! previous one. Only the latest snapshot is kept.
//!
//! ## Example
//!
//! ```ignore
//! use rigscope::memory::{MemoryReader, ProcessHandle};
//! use rigscope::tracker::{Tracker, TrackerConfig};
//!
//! let process = ProcessHandle::attach("RobloxPlayerBeta.exe")?;
//! let reader = MemoryReader::new(&process);
//!
//! let config = TrackerConfig::builder().include_local_player(false).build();
//! let mut tracker = Tracker::with_config(offsets, config);
//!
//! let diff = tracker.tick(&reader, process.base_address)?;
//! for entity in &tracker.snapshot().entities {
//!     println!("{} {:?}", entity.name, entity.distance);
//! }
//! ```

use std::time::Duration;

use tracing::{debug, info};

use crate::entity::{CachedEntity, Snapshot, SnapshotBuilder, SnapshotDiff};
use crate::error::{Error, Result};
use crate::instance::{
    Camera, DataModel, DEFAULT_MAX_CHILDREN, InstanceId, Players, Remote, Workspace,
};
use crate::memory::{MemoryAccess, MemoryReader};
use crate::offset::OffsetTable;

/// Configuration for the [`Tracker`]
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Delay between ticks when driven by a polling loop
    pub tick_interval: Duration,
    /// Upper bound on slots walked per child list
    pub max_children: usize,
    /// Whether the local player appears in snapshots
    pub include_local_player: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(100),
            max_children: DEFAULT_MAX_CHILDREN,
            include_local_player: true,
        }
    }
}

impl TrackerConfig {
    /// Create a new configuration builder
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }
}

/// Builder for TrackerConfig
#[derive(Debug, Clone, Default)]
pub struct TrackerConfigBuilder {
    tick_interval: Option<Duration>,
    max_children: Option<usize>,
    include_local_player: Option<bool>,
}

impl TrackerConfigBuilder {
    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn max_children(mut self, max_children: usize) -> Self {
        self.max_children = Some(max_children);
        self
    }

    /// Keep or drop the local player's own entity
    pub fn include_local_player(mut self, enabled: bool) -> Self {
        self.include_local_player = Some(enabled);
        self
    }

    pub fn build(self) -> TrackerConfig {
        let default = TrackerConfig::default();
        TrackerConfig {
            tick_interval: self.tick_interval.unwrap_or(default.tick_interval),
            max_children: self.max_children.unwrap_or(default.max_children),
            include_local_player: self
                .include_local_player
                .unwrap_or(default.include_local_player),
        }
    }
}

/// Scene roots resolved from the module base
pub struct Roots<'r, M> {
    pub data_model: DataModel<'r, M>,
    pub players: Players<'r, M>,
    /// Current camera, when the workspace has one
    pub camera: Option<Camera<'r, M>>,
    pub local_player: InstanceId,
}

/// Follow the module's fake data model pointer down to the `Players`
/// service, the current camera and the local player.
pub fn resolve_roots<'r, M: MemoryAccess>(
    remote: Remote<'r, M>,
    module_base: u64,
) -> Result<Roots<'r, M>> {
    let layout = remote.offsets().data_model;
    let reader = remote.reader();

    let fake = reader.read_address(module_base.wrapping_add(layout.fake_pointer));
    if fake == 0 {
        return Err(Error::RootNotFound("fake data model pointer".to_string()));
    }
    let real = reader.read_address(fake.wrapping_add(layout.real_data_model));

    let data_model = remote
        .instance(real)
        .cast::<DataModel<'r, M>>()
        .ok_or_else(|| Error::RootNotFound("DataModel".to_string()))?;
    let players = data_model
        .find_first_child_of::<Players<'r, M>>()
        .ok_or_else(|| Error::RootNotFound("Players".to_string()))?;

    let workspace = data_model
        .workspace()
        .cast::<Workspace<'r, M>>()
        .or_else(|| data_model.find_first_child_of::<Workspace<'r, M>>());
    let camera =
        workspace.and_then(|workspace| workspace.current_camera().cast::<Camera<'r, M>>());
    if camera.is_none() {
        debug!("No current camera under {}", data_model.id());
    }

    Ok(Roots {
        data_model,
        local_player: players.local_player().id(),
        players,
        camera,
    })
}

/// Builds one snapshot per tick and tracks joins and leaves
pub struct Tracker {
    offsets: OffsetTable,
    config: TrackerConfig,
    snapshot: Snapshot,
    tick: u64,
}

impl Tracker {
    pub fn new(offsets: OffsetTable) -> Self {
        Self::with_config(offsets, TrackerConfig::default())
    }

    pub fn with_config(offsets: OffsetTable, config: TrackerConfig) -> Self {
        if !offsets.is_valid() {
            info!("Offset table {:?} has zero entries", offsets.version);
        }
        Self {
            offsets,
            config,
            snapshot: Snapshot::default(),
            tick: 0,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn offsets(&self) -> &OffsetTable {
        &self.offsets
    }

    /// Swap the offset table, e.g. after the remote was updated
    pub fn update_offsets(&mut self, offsets: OffsetTable) {
        debug!("Offsets {} -> {}", self.offsets.version, offsets.version);
        self.offsets = offsets;
    }

    /// The latest snapshot; empty before the first tick
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Drop the latest snapshot, e.g. after reattaching
    pub fn reset(&mut self) {
        self.snapshot = Snapshot::default();
    }

    fn build_entities<M: MemoryAccess>(
        &self,
        reader: &MemoryReader<M>,
        module_base: u64,
    ) -> Result<Vec<CachedEntity>> {
        let remote =
            Remote::new(reader, &self.offsets).with_max_children(self.config.max_children);
        let roots = resolve_roots(remote, module_base)?;

        let mut builder = SnapshotBuilder::new(remote).local_player(roots.local_player);
        if let Some(camera) = roots.camera {
            builder = builder.viewpoint(camera.position());
        }

        let mut entities = builder.build_all(&roots.players);
        if !self.config.include_local_player {
            entities.retain(|entity| !entity.local_player);
        }
        Ok(entities)
    }

    /// Build a new snapshot and diff it against the previous one.
    ///
    /// Fails only when the roots cannot be resolved; the previous snapshot
    /// is kept in that case.
    pub fn tick<M: MemoryAccess>(
        &mut self,
        reader: &MemoryReader<M>,
        module_base: u64,
    ) -> Result<SnapshotDiff> {
        let entities = self.build_entities(reader, module_base);

        // Reset on failure too
        let degraded = reader.reset_degraded_reads();
        if degraded > 0 {
            debug!("Tick {}: {} degraded reads", self.tick + 1, degraded);
        }
        let entities = entities?;

        self.tick += 1;
        let snapshot = Snapshot::new(self.tick, entities);
        let diff = snapshot.diff(&self.snapshot);

        for key in &diff.joined {
            if let Some(entity) = snapshot.get(*key) {
                info!("{} joined ({})", entity.name, key);
            }
        }
        for key in &diff.left {
            if let Some(entity) = self.snapshot.get(*key) {
                info!("{} left ({})", entity.name, key);
            }
        }
        if !diff.changed.is_empty() {
            debug!("Tick {}: {} entities changed", self.tick, diff.changed.len());
        }

        self.snapshot = snapshot;
        Ok(diff)
    }
}
