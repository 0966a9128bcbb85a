//! Device nodes inside a workspace's `/dev`.
//!
//! A workspace needs `/dev/net/tun` for user-space networking and
//! `/dev/fuse` for the overlay helper, both world read/writable and owned
//! by the workspace user. `/dev/kmsg` must exist for tooling that logs to
//! the kernel ring buffer.
//!
//! A node that already exists is accepted only if it is exactly the device
//! that would have been created; mode and ownership are then re-applied, so
//! running the preparation twice converges on the same result. Anything
//! else at those paths (a symlink, a regular file, a device with other
//! numbers) fails the step with `EEXIST` and is left untouched.

use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nsops_common::constants::{DEVICE_DIR_MODE, DEVICE_MODE, FUSE_DEVICE, TUN_DEVICE};
use nsops_common::error::{NsopsError, Result};

use crate::kernel::{Kernel, NodeType};

/// Device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Character device.
    Char,
    /// Block device.
    Block,
}

/// A device node to provision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Node path.
    pub path: PathBuf,
    /// Character or block.
    pub kind: DeviceKind,
    /// Major number.
    pub major: u64,
    /// Minor number.
    pub minor: u64,
    /// Permission bits.
    pub mode: u32,
    /// Owning user.
    pub uid: u32,
    /// Owning group.
    pub gid: u32,
}

impl DeviceSpec {
    /// Character device with the standard workspace mode.
    pub fn char_device(path: PathBuf, (major, minor): (u64, u64), uid: u32, gid: u32) -> Self {
        Self {
            path,
            kind: DeviceKind::Char,
            major,
            minor,
            mode: DEVICE_MODE,
            uid,
            gid,
        }
    }
}

/// Prepares the device tree rooted at `dev_dir` for the given owner.
///
/// # Errors
///
/// Returns [`NsopsError::Device`] naming the first sub-step that failed.
/// Nodes created before the failure are left in place.
pub fn prepare_dev(kernel: &dyn Kernel, dev_dir: &Path, uid: u32, gid: u32) -> Result<()> {
    let kmsg = dev_dir.join("kmsg");
    step("kmsg", tolerate_existing(kernel.create_file(&kmsg, 0o644)))?;

    let net_dir = dev_dir.join("net");
    step("net-dir", ensure_directory(kernel, &net_dir))?;

    let tun = DeviceSpec::char_device(net_dir.join("tun"), TUN_DEVICE, uid, gid);
    step("tun", provision(kernel, &tun))?;

    let fuse = DeviceSpec::char_device(dev_dir.join("fuse"), FUSE_DEVICE, uid, gid);
    step("fuse", provision(kernel, &fuse))?;

    tracing::info!(dev = %dev_dir.display(), uid, gid, "device tree prepared");
    Ok(())
}

fn ensure_directory(kernel: &dyn Kernel, path: &Path) -> Result<()> {
    kernel.create_dir_all(path, DEVICE_DIR_MODE)?;
    match kernel.node_type(path)? {
        Some(NodeType::Directory) => Ok(()),
        found => {
            tracing::warn!(path = %path.display(), ?found, "refusing to use a non-directory");
            Err(NsopsError::syscall("mkdir", path, Errno::EEXIST))
        }
    }
}

fn provision(kernel: &dyn Kernel, device: &DeviceSpec) -> Result<()> {
    match kernel.mknod(device) {
        Err(e) if e.is_already_exists() => require_device(kernel, device, e)?,
        result => result?,
    }
    kernel.set_mode(&device.path, device.mode)?;
    kernel.set_owner(&device.path, device.uid, device.gid)
}

/// Accepts an existing node only if it is the device `mknod` would create.
fn require_device(kernel: &dyn Kernel, device: &DeviceSpec, existing: NsopsError) -> Result<()> {
    let expected = NodeType::Device {
        kind: device.kind,
        major: device.major,
        minor: device.minor,
    };
    let found = kernel.node_type(&device.path)?;
    if found == Some(expected) {
        tracing::debug!(path = %device.path.display(), "device node already present");
        return Ok(());
    }
    tracing::warn!(path = %device.path.display(), ?found, "existing node is not the expected device");
    Err(existing)
}

fn tolerate_existing(result: Result<()>) -> Result<()> {
    match result {
        Err(e) if e.is_already_exists() => {
            tracing::debug!(error = %e, "already present");
            Ok(())
        }
        other => other,
    }
}

fn step(name: &'static str, result: Result<()>) -> Result<()> {
    result.map_err(|e| NsopsError::Device {
        step: name,
        source: Box::new(e),
    })
}
