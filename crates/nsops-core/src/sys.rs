//! Raw wrappers for the detached-mount syscalls.
//!
//! `open_tree(2)` and `move_mount(2)` have no libc or nix wrapper, so they
//! are invoked through `syscall(2)` here. This module is the only place in
//! the crate that marshals raw syscall arguments; everything above it works
//! with owned descriptors and [`Errno`] values.

#![allow(unsafe_code)]

use std::ops::BitOr;
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};

use nix::NixPath;
use nix::errno::Errno;

/// Flags accepted by `open_tree(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenTreeFlags(libc::c_uint);

impl OpenTreeFlags {
    /// Return a detached clone of the mount instead of a path handle.
    pub const CLONE: Self = Self(1);
    /// Mark the returned descriptor close-on-exec.
    #[allow(clippy::cast_sign_loss)]
    pub const CLOEXEC: Self = Self(libc::O_CLOEXEC as libc::c_uint);
    /// Apply to the whole subtree (`AT_RECURSIVE`).
    pub const RECURSIVE: Self = Self(0x8000);

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn bits(self) -> libc::c_uint {
        self.0
    }
}

impl BitOr for OpenTreeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Flags accepted by `move_mount(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveMountFlags(libc::c_uint);

impl MoveMountFlags {
    /// No flags.
    pub const EMPTY: Self = Self(0);
    /// The source is the descriptor itself; `from_path` is empty.
    pub const F_EMPTY_PATH: Self = Self(0x0000_0004);

    /// Returns the raw flag bits.
    #[must_use]
    pub const fn bits(self) -> libc::c_uint {
        self.0
    }
}

impl BitOr for MoveMountFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Directory a relative path is resolved against.
#[derive(Debug, Clone, Copy)]
pub enum DirFd<'fd> {
    /// The current working directory (`AT_FDCWD`).
    Cwd,
    /// An open directory or mount descriptor.
    Fd(BorrowedFd<'fd>),
}

impl DirFd<'_> {
    fn raw(self) -> RawFd {
        match self {
            Self::Cwd => libc::AT_FDCWD,
            Self::Fd(fd) => fd.as_raw_fd(),
        }
    }
}

/// Opens the mount at `path` as a descriptor.
///
/// With [`OpenTreeFlags::CLONE`] the result is a detached copy of the mount
/// (and, with [`OpenTreeFlags::RECURSIVE`], of everything below it) that can
/// later be attached anywhere with [`move_mount`].
///
/// # Errors
///
/// Returns the kernel error number: `EPERM` without `CAP_SYS_ADMIN`,
/// `ENOENT` for a missing path, `ENOSYS` on kernels older than 5.2.
pub fn open_tree<P: ?Sized + NixPath>(
    dirfd: DirFd<'_>,
    path: &P,
    flags: OpenTreeFlags,
) -> Result<OwnedFd, Errno> {
    let res = path.with_nix_path(|cstr| {
        // SAFETY: `cstr` is NUL-terminated and outlives the call; the kernel
        // copies the path and keeps no reference to it.
        unsafe {
            libc::syscall(
                libc::SYS_open_tree,
                dirfd.raw(),
                cstr.as_ptr(),
                flags.bits(),
            )
        }
    })?;
    let fd = Errno::result(res)?;
    let fd = RawFd::try_from(fd).map_err(|_| Errno::EOVERFLOW)?;
    // SAFETY: a successful open_tree returns a fresh descriptor that nothing
    // else in this process refers to.
    Ok(unsafe { OwnedFd::from_raw_fd(fd) })
}

/// Moves a mount (or a detached mount tree) to `to_path`.
///
/// Pass an empty `from_path` together with [`MoveMountFlags::F_EMPTY_PATH`]
/// to attach the tree referenced by `from_dirfd` itself. The operation is
/// atomic: on error nothing has been attached.
///
/// # Errors
///
/// Returns the kernel error number unchanged.
pub fn move_mount<P1, P2>(
    from_dirfd: DirFd<'_>,
    from_path: &P1,
    to_dirfd: DirFd<'_>,
    to_path: &P2,
    flags: MoveMountFlags,
) -> Result<(), Errno>
where
    P1: ?Sized + NixPath,
    P2: ?Sized + NixPath,
{
    let res = from_path.with_nix_path(|from| {
        to_path.with_nix_path(|to| {
            // SAFETY: both strings are NUL-terminated and live across the
            // call; no pointer is retained by the kernel.
            unsafe {
                libc::syscall(
                    libc::SYS_move_mount,
                    from_dirfd.raw(),
                    from.as_ptr(),
                    to_dirfd.raw(),
                    to.as_ptr(),
                    flags.bits(),
                )
            }
        })
    })??;
    Errno::result(res).map(drop)
}

/// Checks that `fd` names an open descriptor in this process.
///
/// # Errors
///
/// Returns `EBADF` if the descriptor is closed or negative.
pub fn check_descriptor(fd: RawFd) -> Result<(), Errno> {
    if fd < 0 {
        return Err(Errno::EBADF);
    }
    // SAFETY: F_GETFD reads the descriptor flags and touches no memory.
    let res = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    Errno::result(res).map(drop)
}

/// Sets the permission bits of `path` itself, never of a symlink target.
///
/// # Errors
///
/// Returns the kernel error number; `EOPNOTSUPP` if `path` is a symlink.
pub fn chmod_nofollow<P: ?Sized + NixPath>(path: &P, mode: u32) -> Result<(), Errno> {
    let res = path.with_nix_path(|cstr| {
        // SAFETY: `cstr` is NUL-terminated and outlives the call.
        unsafe {
            libc::fchmodat(
                libc::AT_FDCWD,
                cstr.as_ptr(),
                mode,
                libc::AT_SYMLINK_NOFOLLOW,
            )
        }
    })?;
    Errno::result(res).map(drop)
}
