//! The set of privileged actions and their dispatch.
//!
//! One [`Action`] runs per process. Parameters are validated before any
//! kernel call or helper process is made, so a malformed invocation never
//! has a partial effect.

use std::os::fd::RawFd;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use nsops_common::config::NsopsConfig;
use nsops_common::error::{NsopsError, Result};

use crate::device;
use crate::exec::CommandRunner;
use crate::filesystem::mount::{self, PseudoFs};
use crate::filesystem::overlay::{self, FuseOverlayRequest};
use crate::kernel::Kernel;
use crate::network::veth::{self, NetworkBridgeConfig};

/// Parameters of `open-tree`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenTreeParams {
    /// Mount whose tree is cloned.
    pub target: PathBuf,
    /// Channel the handle is sent over.
    pub pipe_fd: i64,
}

/// Parameters of `move-mount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveMountParams {
    /// Where the tree is attached.
    pub target: PathBuf,
    /// Inherited tree descriptor, or the channel when `from_channel` is set.
    pub pipe_fd: i64,
    /// Receive the handle from `pipe_fd` instead of adopting it.
    pub from_channel: bool,
}

/// Parameters of actions that only take a target path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetParams {
    /// Mount point.
    pub target: PathBuf,
}

/// Parameters of `mount-shiftfs-mark`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShiftfsParams {
    /// Directory to mark.
    pub source: PathBuf,
    /// Mount point.
    pub target: PathBuf,
}

/// Parameters of `prepare-dev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareDevParams {
    /// Owner of the device nodes.
    pub uid: u32,
    /// Group of the device nodes.
    pub gid: u32,
}

/// Parameters of `setup-veth-pair`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VethPairParams {
    /// Process owning the destination network namespace.
    pub target_pid: i64,
    /// Name to publish the namespace under.
    pub name: String,
}

/// One privileged operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Attach an inherited or received mount tree.
    MoveMount(MoveMountParams),
    /// Clone a mount tree and send it over a channel.
    OpenTree(OpenTreeParams),
    /// Make a mount point shared.
    MakeShared(TargetParams),
    /// Mount a FUSE overlay through the helper.
    MountFusefsMark(FuseOverlayRequest),
    /// Mount a shiftfs mark.
    MountShiftfsMark(ShiftfsParams),
    /// Mount `proc`.
    MountProc(TargetParams),
    /// Mount `sysfs`.
    MountSysfs(TargetParams),
    /// Unmount a mount point.
    Unmount(TargetParams),
    /// Create the workspace device nodes.
    PrepareDev(PrepareDevParams),
    /// Bridge a network namespace to the host.
    SetupVethPair(VethPairParams),
}

/// What an action runs against.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    /// Kernel primitives.
    pub kernel: &'a dyn Kernel,
    /// Helper process runner.
    pub runner: &'a dyn CommandRunner,
    /// Global configuration.
    pub config: &'a NsopsConfig,
}

impl Action {
    /// Subcommand name of the action.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MoveMount(_) => "move-mount",
            Self::OpenTree(_) => "open-tree",
            Self::MakeShared(_) => "make-shared",
            Self::MountFusefsMark(_) => "mount-fusefs-mark",
            Self::MountShiftfsMark(_) => "mount-shiftfs-mark",
            Self::MountProc(_) => "mount-proc",
            Self::MountSysfs(_) => "mount-sysfs",
            Self::Unmount(_) => "unmount",
            Self::PrepareDev(_) => "prepare-dev",
            Self::SetupVethPair(_) => "setup-veth-pair",
        }
    }

    /// Checks every parameter without touching the system.
    ///
    /// # Errors
    ///
    /// Returns [`NsopsError::Validation`] naming the first bad parameter.
    pub fn validate(&self) -> Result<()> {
        let action = self.name();
        match self {
            Self::MoveMount(p) => {
                require_path(action, "target", &p.target)?;
                descriptor(action, p.pipe_fd).map(drop)
            }
            Self::OpenTree(p) => {
                require_path(action, "target", &p.target)?;
                descriptor(action, p.pipe_fd).map(drop)
            }
            Self::MakeShared(p) | Self::MountProc(p) | Self::MountSysfs(p) | Self::Unmount(p) => {
                require_path(action, "target", &p.target)
            }
            Self::MountFusefsMark(r) => {
                require_path(action, "source", &r.lower)?;
                require_path(action, "merged", &r.merged)?;
                require_path(action, "upper", &r.upper)?;
                require_path(action, "work", &r.work)?;
                for mapping in [&r.id_mapping.uid, &r.id_mapping.gid].into_iter().flatten() {
                    if mapping.contains([',', '\0']) {
                        return Err(NsopsError::validation(
                            action,
                            format!("id mapping {mapping:?} must not contain ',' or NUL"),
                        ));
                    }
                }
                Ok(())
            }
            Self::MountShiftfsMark(p) => {
                require_path(action, "source", &p.source)?;
                require_path(action, "target", &p.target)
            }
            Self::PrepareDev(_) => Ok(()),
            Self::SetupVethPair(p) => {
                let _ = target_pid(action, p.target_pid)?;
                netns_name(action, &p.name)
            }
        }
    }

    /// Validates and performs the action exactly once.
    ///
    /// # Errors
    ///
    /// Returns the validation error, or the error of the failed operation.
    pub fn execute(&self, ctx: &Context<'_>) -> Result<()> {
        self.validate()?;
        let action = self.name();
        tracing::debug!(action, "executing");
        match self {
            Self::MoveMount(p) => {
                let fd = descriptor(action, p.pipe_fd)?;
                let handle = if p.from_channel {
                    ctx.kernel.receive_tree(fd)?
                } else {
                    ctx.kernel.adopt_tree(fd)?
                };
                ctx.kernel.attach_tree(handle, &p.target)?;
                tracing::info!(mount_point = %p.target.display(), "mount tree attached");
                Ok(())
            }
            Self::OpenTree(p) => {
                let fd = descriptor(action, p.pipe_fd)?;
                let handle = ctx.kernel.open_tree(&p.target)?;
                ctx.kernel.send_tree(fd, handle)?;
                tracing::info!(mount_point = %p.target.display(), channel = fd, "mount tree handed off");
                Ok(())
            }
            Self::MakeShared(p) => mount::make_shared(ctx.kernel, &p.target),
            Self::MountFusefsMark(r) => {
                overlay::mount_fusefs_mark(ctx.runner, &ctx.config.fuse_overlayfs_rel, r)
            }
            Self::MountShiftfsMark(p) => mount::mount_shiftfs_mark(ctx.kernel, &p.source, &p.target),
            Self::MountProc(p) => mount::mount_pseudo(ctx.kernel, PseudoFs::Proc, &p.target),
            Self::MountSysfs(p) => mount::mount_pseudo(ctx.kernel, PseudoFs::Sysfs, &p.target),
            Self::Unmount(p) => mount::unmount(ctx.kernel, &p.target),
            Self::PrepareDev(p) => device::prepare_dev(ctx.kernel, &ctx.config.dev_dir, p.uid, p.gid),
            Self::SetupVethPair(p) => {
                let pid = target_pid(action, p.target_pid)?;
                let bridge = NetworkBridgeConfig::new(pid, p.name.clone(), ctx.config);
                veth::setup_veth_pair(ctx.kernel, ctx.runner, &bridge)
            }
        }
    }
}

fn require_path(action: &'static str, flag: &str, path: &Path) -> Result<()> {
    let bytes = path.as_os_str().as_bytes();
    if bytes.is_empty() {
        return Err(NsopsError::validation(action, format!("--{flag} must not be empty")));
    }
    if bytes.contains(&0) {
        return Err(NsopsError::validation(action, format!("--{flag} contains a NUL byte")));
    }
    Ok(())
}

fn descriptor(action: &'static str, value: i64) -> Result<RawFd> {
    RawFd::try_from(value)
        .ok()
        .filter(|fd| *fd >= 0)
        .ok_or_else(|| NsopsError::validation(action, format!("--pipe-fd {value} is not a valid descriptor")))
}

fn target_pid(action: &'static str, value: i64) -> Result<u32> {
    i32::try_from(value)
        .ok()
        .filter(|pid| *pid > 0)
        .and_then(|pid| u32::try_from(pid).ok())
        .ok_or_else(|| NsopsError::validation(action, format!("--target-pid {value} is not a valid pid")))
}

fn netns_name(action: &'static str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(NsopsError::validation(
            action,
            format!("--name {name:?} is not a valid namespace name"),
        ));
    }
    Ok(())
}
