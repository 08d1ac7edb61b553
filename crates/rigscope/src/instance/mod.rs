//! References into the remote instance tree.
//!
//! An [`Instance`] is a remote address bound to a [`Remote`] (reader plus
//! offset table). It caches nothing: every call re-reads live memory, so two
//! calls may disagree if the remote tree changes in between. Child walks are
//! best-effort and may observe a torn list while the remote mutates it.

mod view;

use std::fmt;
use std::hash::{Hash, Hasher};

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::memory::{MemoryAccess, MemoryReader};
use crate::offset::OffsetTable;

pub use view::*;

/// Distance between consecutive child slots
pub const CHILD_SLOT_STRIDE: u64 = 0x10;

/// Default upper bound on slots walked per child list
pub const DEFAULT_MAX_CHILDREN: usize = 8192;

/// Name the remote reports for instances with no name string
pub const UNKNOWN_NAME: &str = "unknown";

/// Remote address of an instance; zero means "no object"
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct InstanceId(pub u64);

impl InstanceId {
    pub const NULL: Self = Self(0);

    pub fn address(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl From<u64> for InstanceId {
    fn from(address: u64) -> Self {
        Self(address)
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Reader and offset table borrowed for the duration of a traversal
pub struct Remote<'r, M> {
    reader: &'r MemoryReader<M>,
    offsets: &'r OffsetTable,
    max_children: usize,
}

impl<M> Clone for Remote<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Remote<'_, M> {}

impl<'r, M: MemoryAccess> Remote<'r, M> {
    pub fn new(reader: &'r MemoryReader<M>, offsets: &'r OffsetTable) -> Self {
        Self {
            reader,
            offsets,
            max_children: DEFAULT_MAX_CHILDREN,
        }
    }

    pub fn with_max_children(mut self, max_children: usize) -> Self {
        self.max_children = max_children;
        self
    }

    pub fn reader(&self) -> &'r MemoryReader<M> {
        self.reader
    }

    pub fn offsets(&self) -> &'r OffsetTable {
        self.offsets
    }

    pub fn instance(self, id: impl Into<InstanceId>) -> Instance<'r, M> {
        Instance {
            remote: self,
            id: id.into(),
        }
    }

    fn read_string(&self, address: u64) -> String {
        self.reader.read_string(address, &self.offsets.string)
    }
}

/// Untyped reference to one remote instance.
///
/// Equality and hashing use the address only.
pub struct Instance<'r, M> {
    remote: Remote<'r, M>,
    id: InstanceId,
}

impl<M> Clone for Instance<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M> Copy for Instance<'_, M> {}

impl<M> PartialEq for Instance<'_, M> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<M> Eq for Instance<'_, M> {}

impl<M> Hash for Instance<'_, M> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<M> fmt::Debug for Instance<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.id).finish()
    }
}

impl<'r, M: MemoryAccess> Instance<'r, M> {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn address(&self) -> u64 {
        self.id.0
    }

    pub fn is_null(&self) -> bool {
        self.id.is_null()
    }

    pub fn remote(&self) -> Remote<'r, M> {
        self.remote
    }

    fn offsets(&self) -> &'r OffsetTable {
        self.remote.offsets
    }

    /// Typed read at `offset` from this instance. No class validation.
    fn read<T: Pod>(&self, offset: u64) -> T {
        self.remote.reader.read(self.id.0.wrapping_add(offset))
    }

    /// Follow the pointer stored at `offset`
    fn read_instance(&self, offset: u64) -> Instance<'r, M> {
        self.remote.instance(self.read::<u64>(offset))
    }

    /// String whose header is embedded at `offset`
    fn read_inline_string(&self, offset: u64) -> String {
        self.remote.read_string(self.id.0.wrapping_add(offset))
    }

    pub fn name(&self) -> String {
        let ptr = self.read::<u64>(self.offsets().instance.name);
        if ptr == 0 {
            return UNKNOWN_NAME.to_string();
        }
        self.remote.read_string(ptr)
    }

    pub fn class_name(&self) -> String {
        let layout = &self.offsets().instance;
        let descriptor = self.read::<u64>(layout.class_descriptor);
        if descriptor == 0 {
            return String::new();
        }
        let name = self
            .remote
            .reader
            .read_address(descriptor.wrapping_add(layout.class_name));
        self.remote.read_string(name)
    }

    pub fn is_a(&self, class_name: &str) -> bool {
        self.class_name() == class_name
    }

    pub fn parent(&self) -> Instance<'r, M> {
        self.read_instance(self.offsets().instance.parent)
    }

    /// Walk the child list once, in slot order.
    ///
    /// The walk is not atomic: a child added or removed concurrently may be
    /// missed or show up as a stale slot. Lists whose end precedes their
    /// start are treated as empty, and a trailing partial slot is ignored.
    pub fn children(&self) -> Vec<Instance<'r, M>> {
        let layout = &self.offsets().instance;
        let reader = self.remote.reader;

        let record = self.read::<u64>(layout.children_start);
        if record == 0 {
            return Vec::new();
        }

        let begin = reader.read_address(record);
        let end = reader.read_address(record.wrapping_add(layout.children_end));
        if begin == 0 || end <= begin {
            return Vec::new();
        }

        let slots = ((end - begin) / CHILD_SLOT_STRIDE) as usize;
        if slots > self.remote.max_children {
            debug!(
                "Child list of {} claims {} slots, walking {}",
                self.id, slots, self.remote.max_children
            );
        }

        (0..slots.min(self.remote.max_children) as u64)
            .map(|slot| {
                let child = reader.read_address(begin + slot * CHILD_SLOT_STRIDE);
                self.remote.instance(child)
            })
            .collect()
    }

    /// First child whose name equals `name`
    pub fn find_first_child(&self, name: &str) -> Option<Instance<'r, M>> {
        self.children().into_iter().find(|child| child.name() == name)
    }

    /// First child whose class name equals `class_name`
    pub fn find_first_child_by_class(&self, class_name: &str) -> Option<Instance<'r, M>> {
        self.children()
            .into_iter()
            .find(|child| child.class_name() == class_name)
    }

    /// First child that is an instance of archetype `A`
    pub fn find_first_child_of<A: Archetype<'r, M>>(&self) -> Option<A> {
        self.children().into_iter().find_map(|child| child.cast::<A>())
    }

    /// Check the class name and, if it matches, view this instance as `A`
    pub fn cast<A: Archetype<'r, M>>(self) -> Option<A> {
        if self.is_null() {
            return None;
        }
        let class_name = self.class_name();
        A::matches(&class_name).then(|| A::wrap(self))
    }

    /// Depth-first pre-order walk down to `max_depth` levels below this one.
    ///
    /// A child that is already an ancestor on the current path (a cycle in
    /// a torn child list) is skipped with its subtree.
    pub fn descendants(&self, max_depth: usize) -> Vec<(usize, Instance<'r, M>)> {
        let mut out = Vec::new();
        let mut stack = vec![(0usize, *self)];
        let mut path: Vec<InstanceId> = Vec::new();

        while let Some((depth, instance)) = stack.pop() {
            path.truncate(depth);
            if path.contains(&instance.id) {
                debug!("Skipping cycle back to {}", instance.id);
                continue;
            }
            path.push(instance.id);
            out.push((depth, instance));
            if depth >= max_depth {
                continue;
            }
            for child in instance.children().into_iter().rev() {
                if !child.is_null() {
                    stack.push((depth + 1, child));
                }
            }
        }

        out
    }
}
