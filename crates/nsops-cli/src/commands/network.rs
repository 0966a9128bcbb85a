//! `nsops setup-veth-pair`: connect a workspace network namespace.

use clap::Args;
use nsops_core::action::{Action, VethPairParams};

/// Arguments for the `setup-veth-pair` command.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SetupVethPairArgs {
    /// Process whose network namespace receives the container endpoint.
    #[arg(long, allow_hyphen_values = true)]
    pub target_pid: i64,

    /// Name the namespace is published under.
    #[arg(long)]
    pub name: String,
}

impl From<SetupVethPairArgs> for Action {
    fn from(args: SetupVethPairArgs) -> Self {
        Self::SetupVethPair(VethPairParams {
            target_pid: args.target_pid,
            name: args.name,
        })
    }
}
