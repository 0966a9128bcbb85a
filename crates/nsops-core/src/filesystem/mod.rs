//! Filesystem operators run inside a workspace's mount namespace.
//!
//! Provides propagation changes, the FUSE overlay and shiftfs marks,
//! pseudo-filesystem mounts, and unmounting.

pub mod mount;
pub mod overlay;
