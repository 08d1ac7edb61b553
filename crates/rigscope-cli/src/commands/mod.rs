//! CLI command implementations.

pub mod offsets;
pub mod tree;
pub mod watch;
