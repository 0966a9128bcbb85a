//! CLI command definitions and dispatch.

pub mod device;
pub mod filesystem;
pub mod mount;
pub mod network;

use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use nsops_common::config::NsopsConfig;
use nsops_common::constants::CONFIG_ENV;
use nsops_core::action::{Action, Context};
use nsops_core::exec::SystemRunner;
use nsops_core::kernel::LinuxKernel;

use crate::logging::LogFormat;

/// nsops: one privileged namespace operation per invocation.
#[derive(Parser, Debug)]
#[command(name = "nsops", version, about, long_about = None)]
pub struct Cli {
    /// Operation to perform.
    #[command(subcommand)]
    pub command: Command,

    /// Options shared by every operation.
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// Global options.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct GlobalArgs {
    /// JSON configuration file.
    #[arg(long, global = true, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    /// `ip` tool, overriding the configuration file.
    #[arg(long, global = true, env = "NSOPS_IP_BIN")]
    pub ip_bin: Option<PathBuf>,

    /// `iptables` tool, overriding the configuration file.
    #[arg(long, global = true, env = "NSOPS_IPTABLES_BIN")]
    pub iptables_bin: Option<PathBuf>,

    /// Directory of named network namespaces, overriding the configuration file.
    #[arg(long, global = true, env = "NSOPS_NETNS_DIR")]
    pub netns_dir: Option<PathBuf>,

    /// Log line format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,
}

impl GlobalArgs {
    /// Loads the configuration file, if any, and applies flag overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// resulting configuration is invalid.
    pub fn resolve_config(&self) -> anyhow::Result<NsopsConfig> {
        let mut config = match &self.config {
            Some(path) => NsopsConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => NsopsConfig::default(),
        };
        if let Some(ip_bin) = &self.ip_bin {
            config.ip_bin.clone_from(ip_bin);
        }
        if let Some(iptables_bin) = &self.iptables_bin {
            config.iptables_bin.clone_from(iptables_bin);
        }
        if let Some(netns_dir) = &self.netns_dir {
            config.netns_dir.clone_from(netns_dir);
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Available operations.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Attach a transferred mount tree at a target path.
    MoveMount(mount::MoveMountArgs),
    /// Clone a mount tree and send its handle over a channel.
    OpenTree(mount::OpenTreeArgs),
    /// Mark a mount point as shared.
    MakeShared(filesystem::TargetArgs),
    /// Mount a FUSE overlay through the bundled helper.
    MountFusefsMark(filesystem::FusefsMarkArgs),
    /// Mount a shiftfs mark.
    MountShiftfsMark(filesystem::ShiftfsMarkArgs),
    /// Mount procfs.
    MountProc(filesystem::TargetArgs),
    /// Mount sysfs.
    MountSysfs(filesystem::TargetArgs),
    /// Detach a mount.
    Unmount(filesystem::TargetArgs),
    /// Provision the workspace device nodes.
    PrepareDev(device::PrepareDevArgs),
    /// Bridge a process's network namespace to the host.
    SetupVethPair(network::SetupVethPairArgs),
}

impl Command {
    /// Converts the parsed flags into the action they request.
    pub fn into_action(self) -> Action {
        match self {
            Self::MoveMount(args) => args.into(),
            Self::OpenTree(args) => args.into(),
            Self::MakeShared(args) => Action::MakeShared(args.into()),
            Self::MountFusefsMark(args) => args.into(),
            Self::MountShiftfsMark(args) => args.into(),
            Self::MountProc(args) => Action::MountProc(args.into()),
            Self::MountSysfs(args) => Action::MountSysfs(args.into()),
            Self::Unmount(args) => Action::Unmount(args.into()),
            Self::PrepareDev(args) => args.into(),
            Self::SetupVethPair(args) => args.into(),
        }
    }
}

/// Resolves configuration and runs the requested action once.
///
/// # Errors
///
/// Returns an error if configuration is invalid or the action fails.
pub fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = cli.global.resolve_config()?;
    let action = cli.command.into_action();
    tracing::debug!(action = action.name(), "dispatching");

    let ctx = Context {
        kernel: &LinuxKernel,
        runner: &SystemRunner,
        config: &config,
    };
    action
        .execute(&ctx)
        .with_context(|| format!("{} failed", action.name()))
}
