//! Per-tick entity snapshots built from character subtrees.

mod builder;
mod cached;
mod rig;

pub use builder::*;
pub use cached::*;
pub use rig::*;
