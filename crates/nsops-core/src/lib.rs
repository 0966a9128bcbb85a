//! # nsops-core
//!
//! Single-shot privileged operations used to assemble the mount and
//! network topology of a sandboxed workspace container.
//!
//! This crate provides:
//! - **Syscall adapter**: typed wrappers for `open_tree(2)` and `move_mount(2)`.
//! - **Mount transfer**: handing a detached mount tree to another process
//!   over an ancillary-data channel.
//! - **Filesystem**: propagation changes, FUSE overlay and shiftfs marks,
//!   `proc`/`sysfs` mounts, and unmounting.
//! - **Devices**: TUN and FUSE device nodes for the workspace.
//! - **Network**: veth pair, named network namespace, and NAT rules.
//!
//! Every privileged effect goes through either the [`kernel::Kernel`] or the
//! [`exec::CommandRunner`] trait, so an [`action::Action`] can be executed
//! against the real system or against a recording double.
//!
//! Unsafe code is limited to raw syscalls in [`sys`] and descriptor
//! ownership in [`transfer`] and [`kernel`], each with a `// SAFETY:` note.

#[cfg(not(target_os = "linux"))]
compile_error!("nsops-core drives Linux-only kernel interfaces (detached mounts, mount propagation, device nodes)");

pub mod action;
pub mod device;
pub mod exec;
pub mod filesystem;
pub mod kernel;
pub mod network;
pub mod sys;
pub mod transfer;

#[cfg(test)]
pub(crate) mod testing;
