//! Mount subcommands: shared propagation, overlay and shiftfs marks,
//! pseudo filesystems, unmount.

use std::path::PathBuf;

use clap::Args;
use nsops_core::action::{Action, ShiftfsParams, TargetParams};
use nsops_core::filesystem::overlay::{FuseOverlayRequest, IdMapping};

/// Arguments of commands that act on a single mount point.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TargetArgs {
    /// Mount point.
    #[arg(long)]
    pub target: PathBuf,
}

impl From<TargetArgs> for TargetParams {
    fn from(args: TargetArgs) -> Self {
        Self {
            target: args.target,
        }
    }
}

/// Arguments for the `mount-fusefs-mark` command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct FusefsMarkArgs {
    /// Lower layer; the helper binary is resolved below it.
    #[arg(long)]
    pub source: PathBuf,

    /// Mount point of the merged view.
    #[arg(long)]
    pub merged: PathBuf,

    /// Writable upper layer.
    #[arg(long)]
    pub upper: PathBuf,

    /// Overlay work directory.
    #[arg(long)]
    pub work: PathBuf,

    /// UID mapping passed through to the helper.
    #[arg(long)]
    pub uidmapping: Option<String>,

    /// GID mapping passed through to the helper.
    #[arg(long)]
    pub gidmapping: Option<String>,
}

impl From<FusefsMarkArgs> for Action {
    fn from(args: FusefsMarkArgs) -> Self {
        Self::MountFusefsMark(FuseOverlayRequest {
            lower: args.source,
            upper: args.upper,
            work: args.work,
            merged: args.merged,
            id_mapping: IdMapping {
                uid: args.uidmapping,
                gid: args.gidmapping,
            },
        })
    }
}

/// Arguments for the `mount-shiftfs-mark` command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ShiftfsMarkArgs {
    /// Directory to mark.
    #[arg(long)]
    pub source: PathBuf,

    /// Mount point.
    #[arg(long)]
    pub target: PathBuf,
}

impl From<ShiftfsMarkArgs> for Action {
    fn from(args: ShiftfsMarkArgs) -> Self {
        Self::MountShiftfsMark(ShiftfsParams {
            source: args.source,
            target: args.target,
        })
    }
}
