//! `nsops prepare-dev`: provision workspace device nodes.

use clap::Args;
use nsops_core::action::{Action, PrepareDevParams};

/// Arguments for the `prepare-dev` command.
#[derive(Args, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrepareDevArgs {
    /// Owner of the device nodes.
    #[arg(long)]
    pub uid: u32,

    /// Group of the device nodes.
    #[arg(long)]
    pub gid: u32,
}

impl From<PrepareDevArgs> for Action {
    fn from(args: PrepareDevArgs) -> Self {
        Self::PrepareDev(PrepareDevParams {
            uid: args.uid,
            gid: args.gid,
        })
    }
}
