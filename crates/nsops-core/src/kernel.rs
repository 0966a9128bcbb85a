//! Privileged kernel-facing primitives behind one trait.
//!
//! Operators never call `mount(2)`, `mknod(2)` and friends directly; they go
//! through [`Kernel`] so the same code runs against [`LinuxKernel`] in
//! production and against a recording double in tests.

use std::fs::{DirBuilder, OpenOptions};
use std::os::fd::{BorrowedFd, RawFd};
use std::os::unix::fs::{DirBuilderExt, FileTypeExt, MetadataExt, OpenOptionsExt};
use std::path::Path;

use nix::mount::{MntFlags, mount, umount2};
use nix::sys::stat::{Mode, SFlag, major, makedev, minor, mknod};
use nsops_common::error::{NsopsError, Result};

use crate::device::{DeviceKind, DeviceSpec};
use crate::filesystem::mount::MountRequest;
use crate::transfer::MountTreeHandle;

/// What occupies a path, as seen without following a final symlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Character or block device.
    Device {
        /// Character or block.
        kind: DeviceKind,
        /// Major number.
        major: u64,
        /// Minor number.
        minor: u64,
    },
    /// Socket, FIFO or anything else.
    Other,
}

/// Privileged operations on the calling process's namespaces.
pub trait Kernel {
    /// Performs `mount(2)`.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Syscall`] with the kernel error number.
    fn mount(&self, request: &MountRequest) -> Result<()>;

    /// Performs a plain, non-recursive `umount2(2)` without flags.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Syscall`] with the kernel error number.
    fn unmount(&self, target: &Path) -> Result<()>;

    /// Opens a recursive, detached clone of the mount tree at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Syscall`] with the kernel error number.
    fn open_tree(&self, path: &Path) -> Result<MountTreeHandle>;

    /// Attaches a detached mount tree at `target`.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Syscall`] with the kernel error number.
    fn attach_tree(&self, handle: MountTreeHandle, target: &Path) -> Result<()>;

    /// Sends a handle over an ancillary-data channel.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Transfer`] if the send fails.
    fn send_tree(&self, channel: RawFd, handle: MountTreeHandle) -> Result<()>;

    /// Receives a handle from an ancillary-data channel.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Transfer`] if nothing usable arrives.
    fn receive_tree(&self, channel: RawFd) -> Result<MountTreeHandle>;

    /// Takes ownership of an inherited mount tree descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Transfer`] if the descriptor is not open.
    fn adopt_tree(&self, fd: RawFd) -> Result<MountTreeHandle>;

    /// Creates a device node.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Syscall`]; `EEXIST` if the node is present.
    fn mknod(&self, device: &DeviceSpec) -> Result<()>;

    /// Reports what is at `path` (`lstat(2)`); `None` if nothing is.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Io`] for any failure other than a missing path.
    fn node_type(&self, path: &Path) -> Result<Option<NodeType>>;

    /// Sets permission bits on `path`. A symlink is never followed.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Syscall`]; `EOPNOTSUPP` when `path` is a symlink.
    fn set_mode(&self, path: &Path, mode: u32) -> Result<()>;

    /// Sets owner and group of `path`. A symlink is never followed.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Io`] on failure.
    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> Result<()>;

    /// Creates an empty file; fails if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Io`], of kind `AlreadyExists` if present.
    fn create_file(&self, path: &Path, mode: u32) -> Result<()>;

    /// Creates a directory and its parents; succeeds if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Io`] on failure.
    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()>;

    /// Creates a symbolic link at `link` pointing at `original`.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Io`], of kind `AlreadyExists` if `link` exists.
    fn symlink(&self, original: &Path, link: &Path) -> Result<()>;
}

/// The running Linux kernel.
#[derive(Debug, Default, Clone, Copy)]
pub struct LinuxKernel;

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> NsopsError + '_ {
    move |source| NsopsError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[allow(unsafe_code)]
fn borrow_channel<'a>(channel: RawFd) -> Result<BorrowedFd<'a>> {
    crate::sys::check_descriptor(channel).map_err(|e| NsopsError::Transfer {
        operation: "channel",
        message: format!("channel descriptor {channel} is not usable: {e}"),
    })?;
    // SAFETY: the descriptor is open and stays open for the rest of this
    // single-shot process; we never close it.
    Ok(unsafe { BorrowedFd::borrow_raw(channel) })
}

impl Kernel for LinuxKernel {
    fn mount(&self, request: &MountRequest) -> Result<()> {
        mount(
            request.source.as_deref(),
            &request.target,
            request.fstype.as_deref(),
            request.flags,
            request.data.as_deref(),
        )
        .map_err(|e| NsopsError::syscall("mount", &request.target, e))?;
        tracing::debug!(
            source = ?request.source,
            mount_point = %request.target.display(),
            fstype = ?request.fstype,
            "mounted"
        );
        Ok(())
    }

    fn unmount(&self, target: &Path) -> Result<()> {
        umount2(target, MntFlags::empty()).map_err(|e| NsopsError::syscall("umount2", target, e))?;
        tracing::debug!(mount_point = %target.display(), "unmounted");
        Ok(())
    }

    fn open_tree(&self, path: &Path) -> Result<MountTreeHandle> {
        MountTreeHandle::open(path)
    }

    fn attach_tree(&self, handle: MountTreeHandle, target: &Path) -> Result<()> {
        handle.attach(target)
    }

    fn send_tree(&self, channel: RawFd, handle: MountTreeHandle) -> Result<()> {
        handle.send(borrow_channel(channel)?)
    }

    fn receive_tree(&self, channel: RawFd) -> Result<MountTreeHandle> {
        MountTreeHandle::receive(borrow_channel(channel)?)
    }

    fn adopt_tree(&self, fd: RawFd) -> Result<MountTreeHandle> {
        MountTreeHandle::adopt(fd)
    }

    fn mknod(&self, device: &DeviceSpec) -> Result<()> {
        let kind = match device.kind {
            DeviceKind::Char => SFlag::S_IFCHR,
            DeviceKind::Block => SFlag::S_IFBLK,
        };
        mknod(
            &device.path,
            kind,
            Mode::from_bits_truncate(device.mode),
            makedev(device.major, device.minor),
        )
        .map_err(|e| NsopsError::syscall("mknod", &device.path, e))?;
        tracing::debug!(path = %device.path.display(), major = device.major, minor = device.minor, "created device node");
        Ok(())
    }

    fn node_type(&self, path: &Path) -> Result<Option<NodeType>> {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(path)(e)),
        };
        let file_type = meta.file_type();
        let device = |kind| NodeType::Device {
            kind,
            major: major(meta.rdev()),
            minor: minor(meta.rdev()),
        };
        Ok(Some(if file_type.is_symlink() {
            NodeType::Symlink
        } else if file_type.is_dir() {
            NodeType::Directory
        } else if file_type.is_file() {
            NodeType::File
        } else if file_type.is_char_device() {
            device(DeviceKind::Char)
        } else if file_type.is_block_device() {
            device(DeviceKind::Block)
        } else {
            NodeType::Other
        }))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<()> {
        crate::sys::chmod_nofollow(path, mode).map_err(|e| NsopsError::syscall("fchmodat", path, e))
    }

    fn set_owner(&self, path: &Path, uid: u32, gid: u32) -> Result<()> {
        std::os::unix::fs::lchown(path, Some(uid), Some(gid)).map_err(io_error(path))
    }

    fn create_file(&self, path: &Path, mode: u32) -> Result<()> {
        let _ = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(mode)
            .open(path)
            .map_err(io_error(path))?;
        Ok(())
    }

    fn create_dir_all(&self, path: &Path, mode: u32) -> Result<()> {
        DirBuilder::new()
            .recursive(true)
            .mode(mode)
            .create(path)
            .map_err(io_error(path))
    }

    fn symlink(&self, original: &Path, link: &Path) -> Result<()> {
        std::os::unix::fs::symlink(original, link).map_err(io_error(link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_file_refuses_existing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kmsg");
        LinuxKernel.create_file(&path, 0o644).expect("first create");
        let err = LinuxKernel.create_file(&path, 0o644).expect_err("second create");
        assert!(err.is_already_exists());
    }

    #[test]
    fn create_dir_all_accepts_existing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("net");
        LinuxKernel.create_dir_all(&path, 0o755).expect("first create");
        LinuxKernel.create_dir_all(&path, 0o755).expect("second create");
        assert!(path.is_dir());
    }

    #[test]
    fn set_mode_ignores_umask() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("node");
        LinuxKernel.create_file(&path, 0o600).expect("create");
        LinuxKernel.set_mode(&path, 0o666).expect("chmod");
        let mode = std::fs::metadata(&path).expect("stat").mode() & 0o777;
        assert_eq!(mode, 0o666);
    }

    #[test]
    fn node_type_does_not_follow_symlinks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("file");
        std::fs::write(&file, b"").expect("write");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&file, &link).expect("symlink");

        assert_eq!(LinuxKernel.node_type(&link).expect("lstat"), Some(NodeType::Symlink));
        assert_eq!(LinuxKernel.node_type(&file).expect("lstat"), Some(NodeType::File));
        assert_eq!(LinuxKernel.node_type(dir.path()).expect("lstat"), Some(NodeType::Directory));
        assert_eq!(LinuxKernel.node_type(&dir.path().join("absent")).expect("lstat"), None);
    }

    #[test]
    fn node_type_reports_device_numbers() {
        assert_eq!(
            LinuxKernel.node_type(Path::new("/dev/null")).expect("lstat"),
            Some(NodeType::Device {
                kind: DeviceKind::Char,
                major: 1,
                minor: 3,
            })
        );
    }

    #[test]
    fn set_mode_refuses_symlink() {
        let dir = tempfile::tempdir().expect("tempdir");
        let victim = dir.path().join("victim");
        LinuxKernel.create_file(&victim, 0o600).expect("create");
        LinuxKernel.set_mode(&victim, 0o600).expect("chmod");
        let link = dir.path().join("tun");
        LinuxKernel.symlink(&victim, &link).expect("link");

        assert!(LinuxKernel.set_mode(&link, 0o666).is_err());
        let mode = std::fs::metadata(&victim).expect("stat").mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn symlink_reports_existing_link() {
        let dir = tempfile::tempdir().expect("tempdir");
        let link = dir.path().join("ws");
        LinuxKernel.symlink(Path::new("/proc/1/ns/net"), &link).expect("link");
        assert_eq!(std::fs::read_link(&link).expect("readlink"), Path::new("/proc/1/ns/net"));
        let err = LinuxKernel.symlink(Path::new("/proc/1/ns/net"), &link).expect_err("dup");
        assert!(err.is_already_exists());
    }

    #[test]
    fn closed_channel_is_rejected_before_sendmsg() {
        let handle = MountTreeHandle::from(std::os::fd::OwnedFd::from(
            std::fs::File::open("/dev/null").expect("open"),
        ));
        let err = LinuxKernel.send_tree(1 << 30, handle).expect_err("bad channel");
        assert!(matches!(err, NsopsError::Transfer { operation: "channel", .. }));
    }
}
