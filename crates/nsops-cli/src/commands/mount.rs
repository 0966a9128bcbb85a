//! `nsops move-mount` and `nsops open-tree`: mount-tree transfer.

use std::path::PathBuf;

use clap::Args;
use nsops_core::action::{Action, MoveMountParams, OpenTreeParams};

/// Arguments for the `move-mount` command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct MoveMountArgs {
    /// Where the mount tree is attached.
    #[arg(long)]
    pub target: PathBuf,

    /// Inherited mount-tree descriptor.
    #[arg(long, allow_hyphen_values = true)]
    pub pipe_fd: i64,

    /// Treat `--pipe-fd` as a channel and receive the handle from it first.
    #[arg(long)]
    pub from_channel: bool,
}

impl From<MoveMountArgs> for Action {
    fn from(args: MoveMountArgs) -> Self {
        Self::MoveMount(MoveMountParams {
            target: args.target,
            pipe_fd: args.pipe_fd,
            from_channel: args.from_channel,
        })
    }
}

/// Arguments for the `open-tree` command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct OpenTreeArgs {
    /// Mount whose tree is cloned.
    #[arg(long)]
    pub target: PathBuf,

    /// Socket the handle is sent over.
    #[arg(long, allow_hyphen_values = true)]
    pub pipe_fd: i64,
}

impl From<OpenTreeArgs> for Action {
    fn from(args: OpenTreeArgs) -> Self {
        Self::OpenTree(OpenTreeParams {
            target: args.target,
            pipe_fd: args.pipe_fd,
        })
    }
}
