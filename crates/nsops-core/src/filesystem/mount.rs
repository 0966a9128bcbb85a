//! Kernel mount operators.
//!
//! Each operator issues exactly one `mount(2)` or `umount2(2)` call and
//! surfaces the kernel error number unchanged.

use std::fmt;
use std::path::{Path, PathBuf};

use nix::mount::MsFlags;
use nsops_common::error::Result;

use crate::kernel::Kernel;

/// Arguments of a single `mount(2)` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRequest {
    /// Mount source, or `None` for no source.
    pub source: Option<String>,
    /// Mount point.
    pub target: PathBuf,
    /// Filesystem type, `None` for propagation changes.
    pub fstype: Option<String>,
    /// Mount flags.
    pub flags: MsFlags,
    /// Filesystem-specific option string.
    pub data: Option<String>,
}

impl MountRequest {
    /// Switches the propagation type of `target` to shared.
    pub fn make_shared(target: &Path) -> Self {
        Self {
            source: Some("none".into()),
            target: target.to_path_buf(),
            fstype: None,
            flags: MsFlags::MS_SHARED,
            data: None,
        }
    }

    /// Mounts a shiftfs mark of `source` at `target`.
    pub fn shiftfs_mark(source: &Path, target: &Path) -> Self {
        Self {
            source: Some(source.display().to_string()),
            target: target.to_path_buf(),
            fstype: Some("shiftfs".into()),
            flags: MsFlags::empty(),
            data: Some("mark".into()),
        }
    }

    /// Mounts a pseudo filesystem at `target`.
    pub fn pseudo(fs: PseudoFs, target: &Path) -> Self {
        Self {
            source: Some(fs.name().into()),
            target: target.to_path_buf(),
            fstype: Some(fs.name().into()),
            flags: MsFlags::empty(),
            data: None,
        }
    }
}

/// Kernel pseudo filesystems a workspace needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PseudoFs {
    /// `proc`
    Proc,
    /// `sysfs`
    Sysfs,
}

impl PseudoFs {
    /// Filesystem type name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Proc => "proc",
            Self::Sysfs => "sysfs",
        }
    }
}

impl fmt::Display for PseudoFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Makes the mount at `target` a shared peer.
///
/// # Errors
///
/// Returns the `mount(2)` error number.
pub fn make_shared(kernel: &dyn Kernel, target: &Path) -> Result<()> {
    kernel.mount(&MountRequest::make_shared(target))?;
    tracing::info!(mount_point = %target.display(), "mount propagation set to shared");
    Ok(())
}

/// Mounts a shiftfs mark of `source` at `target`.
///
/// # Errors
///
/// Returns the `mount(2)` error number.
pub fn mount_shiftfs_mark(kernel: &dyn Kernel, source: &Path, target: &Path) -> Result<()> {
    kernel.mount(&MountRequest::shiftfs_mark(source, target))?;
    tracing::info!(source = %source.display(), mount_point = %target.display(), "shiftfs mark mounted");
    Ok(())
}

/// Mounts `proc` or `sysfs` at `target`.
///
/// # Errors
///
/// Returns the `mount(2)` error number.
pub fn mount_pseudo(kernel: &dyn Kernel, fs: PseudoFs, target: &Path) -> Result<()> {
    kernel.mount(&MountRequest::pseudo(fs, target))?;
    tracing::info!(fs = %fs, mount_point = %target.display(), "pseudo filesystem mounted");
    Ok(())
}

/// Detaches the mount at `target`.
///
/// # Errors
///
/// Returns the `umount2(2)` error number.
pub fn unmount(kernel: &dyn Kernel, target: &Path) -> Result<()> {
    kernel.unmount(target)?;
    tracing::info!(mount_point = %target.display(), "unmounted");
    Ok(())
}
