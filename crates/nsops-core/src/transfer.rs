//! Cross-namespace mount transfer.
//!
//! A privileged process opens a detached mount tree and sends the resulting
//! descriptor as `SCM_RIGHTS` ancillary data over a channel whose ends are
//! held by the orchestrator. A second process, already inside the target
//! mount namespace, receives (or inherits) the descriptor and attaches it
//! with `move_mount(2)`.
//!
//! The channel must preserve message boundaries (`SOCK_DGRAM` or
//! `SOCK_SEQPACKET`): the message carries no payload bytes, only the
//! control message.

#![allow(unsafe_code)]

use std::io::{IoSlice, IoSliceMut};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::path::Path;

use nix::sys::socket::{ControlMessage, ControlMessageOwned, MsgFlags, recvmsg, sendmsg};
use nsops_common::error::{NsopsError, Result};

use crate::sys::{self, DirFd, MoveMountFlags, OpenTreeFlags};

/// Owned reference to a detached mount tree.
///
/// Sending or attaching the handle consumes it, so a handle that has been
/// passed on cannot be used again by the sender.
#[derive(Debug)]
pub struct MountTreeHandle {
    fd: OwnedFd,
}

impl MountTreeHandle {
    /// Clones the mount tree at `path` (recursively) into a detached handle.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Syscall`] with the raw kernel error number.
    pub fn open(path: &Path) -> Result<Self> {
        let flags = OpenTreeFlags::CLONE | OpenTreeFlags::RECURSIVE | OpenTreeFlags::CLOEXEC;
        let fd = sys::open_tree(DirFd::Cwd, path, flags)
            .map_err(|e| NsopsError::syscall("open_tree", path, e))?;
        tracing::debug!(path = %path.display(), fd = fd.as_raw_fd(), "opened detached mount tree");
        Ok(Self { fd })
    }

    /// Takes ownership of a descriptor inherited from the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Transfer`] if `fd` is negative or not open.
    pub fn adopt(fd: RawFd) -> Result<Self> {
        sys::check_descriptor(fd).map_err(|e| NsopsError::Transfer {
            operation: "adopt",
            message: format!("descriptor {fd} is not usable: {e}"),
        })?;
        // SAFETY: the descriptor is open and was handed to this process for
        // exclusive use; nothing else here wraps it.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }

    /// Attaches the tree at `target` and releases the handle.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Syscall`]; on failure nothing was attached.
    pub fn attach(self, target: &Path) -> Result<()> {
        sys::move_mount(
            DirFd::Fd(self.fd.as_fd()),
            "",
            DirFd::Cwd,
            target,
            MoveMountFlags::F_EMPTY_PATH,
        )
        .map_err(|e| NsopsError::syscall("move_mount", target, e))?;
        tracing::debug!(mount_point = %target.display(), "attached mount tree");
        Ok(())
    }

    /// Sends the handle over `channel` as ancillary data.
    ///
    /// The local descriptor is closed once the kernel has queued the message;
    /// the receiver holds the only remaining reference.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Transfer`] if `sendmsg(2)` fails.
    pub fn send(self, channel: BorrowedFd<'_>) -> Result<()> {
        let fds = [self.fd.as_raw_fd()];
        let cmsgs = [ControlMessage::ScmRights(&fds)];
        let iov: [IoSlice<'_>; 0] = [];
        let _ = sendmsg::<()>(channel.as_raw_fd(), &iov, &cmsgs, MsgFlags::empty(), None)
            .map_err(|e| NsopsError::Transfer {
                operation: "send",
                message: format!("sendmsg on fd {}: {e}", channel.as_raw_fd()),
            })?;
        tracing::debug!(channel = channel.as_raw_fd(), "sent mount tree handle");
        Ok(())
    }

    /// Receives a handle previously sent with [`MountTreeHandle::send`].
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Transfer`] if `recvmsg(2)` fails, the control
    /// message was truncated, or the message carried no descriptor.
    pub fn receive(channel: BorrowedFd<'_>) -> Result<Self> {
        let transfer_err = |message: String| NsopsError::Transfer {
            operation: "receive",
            message,
        };

        let mut buf = [0u8; 1];
        let mut iov = [IoSliceMut::new(&mut buf)];
        let mut space = nix::cmsg_space!([RawFd; 1]);
        let msg = recvmsg::<()>(
            channel.as_raw_fd(),
            &mut iov,
            Some(&mut space),
            MsgFlags::MSG_CMSG_CLOEXEC,
        )
        .map_err(|e| transfer_err(format!("recvmsg on fd {}: {e}", channel.as_raw_fd())))?;

        let mut received = Vec::new();
        for cmsg in msg.cmsgs().map_err(|e| transfer_err(e.to_string()))? {
            if let ControlMessageOwned::ScmRights(fds) = cmsg {
                // SAFETY: SCM_RIGHTS installed these descriptors in our table
                // and we are their only owner.
                received.extend(fds.into_iter().map(|fd| unsafe { OwnedFd::from_raw_fd(fd) }));
            }
        }
        if msg.flags.contains(MsgFlags::MSG_CTRUNC) {
            return Err(transfer_err("control message truncated".into()));
        }

        let mut received = received.into_iter();
        let fd = received
            .next()
            .ok_or_else(|| transfer_err("message carried no descriptor".into()))?;
        if received.len() > 0 {
            tracing::warn!(extra = received.len(), "dropping unexpected extra descriptors");
        }
        tracing::debug!(fd = fd.as_raw_fd(), "received mount tree handle");
        Ok(Self { fd })
    }
}

impl From<OwnedFd> for MountTreeHandle {
    fn from(fd: OwnedFd) -> Self {
        Self { fd }
    }
}

impl AsFd for MountTreeHandle {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl From<MountTreeHandle> for OwnedFd {
    fn from(handle: MountTreeHandle) -> Self {
        handle.fd
    }
}
