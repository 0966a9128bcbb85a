//! veth pair and NAT setup.
//!
//! The bootstrap is an ordered list of steps. Later steps depend on the
//! objects created by earlier ones, so execution stops at the first failure
//! and reports that step's full command line and output. Nothing is rolled
//! back; the orchestrator tears the namespace down and starts over.

use std::path::PathBuf;

use nsops_common::config::{BridgeSettings, NsopsConfig};
use nsops_common::error::{NsopsError, Result};

use crate::exec::{CommandLine, CommandRunner};
use crate::kernel::Kernel;

/// Everything needed to bridge one workspace network namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBridgeConfig {
    /// Process whose network namespace receives the container endpoint.
    pub target_pid: u32,
    /// Name under which the namespace is published.
    pub netns_name: String,
    /// Interface names and addresses.
    pub settings: BridgeSettings,
    /// `ip` tool.
    pub ip_bin: PathBuf,
    /// `iptables` tool.
    pub iptables_bin: PathBuf,
    /// Directory of named namespaces.
    pub netns_dir: PathBuf,
}

impl NetworkBridgeConfig {
    /// Combines invocation parameters with the global configuration.
    pub fn new(target_pid: u32, netns_name: impl Into<String>, config: &NsopsConfig) -> Self {
        Self {
            target_pid,
            netns_name: netns_name.into(),
            settings: config.bridge.clone(),
            ip_bin: config.ip_bin.clone(),
            iptables_bin: config.iptables_bin.clone(),
            netns_dir: config.netns_dir.clone(),
        }
    }

    fn ip(&self) -> CommandLine {
        CommandLine::new(&self.ip_bin)
    }

    fn ip_in_netns(&self) -> CommandLine {
        self.ip()
            .args(["netns", "exec", self.netns_name.as_str()])
            .arg(self.ip_bin.display().to_string())
    }

    fn iptables(&self) -> CommandLine {
        CommandLine::new(&self.iptables_bin)
    }
}

/// One step of the bootstrap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeStep {
    /// Run an external networking tool.
    Run {
        /// What the step does.
        description: &'static str,
        /// The tool invocation.
        command: CommandLine,
    },
    /// Publish a process's network namespace under a name.
    PublishNamespace {
        /// Directory holding named namespaces.
        dir: PathBuf,
        /// Link to create.
        link: PathBuf,
        /// The `/proc/<pid>/ns/net` handle the link points at.
        target: PathBuf,
    },
}

impl BridgeStep {
    /// What the step does.
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Run { description, .. } => *description,
            Self::PublishNamespace { .. } => "link the network namespace",
        }
    }

    /// Argument vector identifying the step in logs and errors.
    pub fn argv(&self) -> Vec<String> {
        match self {
            Self::Run { command, .. } => command.argv(),
            Self::PublishNamespace { link, target, .. } => vec![
                "symlink".into(),
                target.display().to_string(),
                link.display().to_string(),
            ],
        }
    }

    fn execute(&self, kernel: &dyn Kernel, runner: &dyn CommandRunner) -> Result<()> {
        match self {
            Self::Run {
                description,
                command,
            } => runner.run_step(description, command).map(drop),
            Self::PublishNamespace { dir, link, target } => {
                kernel
                    .create_dir_all(dir, 0o755)
                    .map_err(|e| {
                        let argv = vec!["mkdir".into(), dir.display().to_string()];
                        failed("create the netns directory", argv, &e)
                    })?;
                kernel
                    .symlink(target, link)
                    .map_err(|e| failed(self.description(), self.argv(), &e))
            }
        }
    }
}

fn failed(step: &str, command: Vec<String>, cause: &NsopsError) -> NsopsError {
    NsopsError::Command {
        step: step.to_owned(),
        command,
        output: String::new(),
        status: cause.to_string(),
    }
}

/// Lays out the bootstrap steps in execution order.
pub fn plan(config: &NetworkBridgeConfig) -> Vec<BridgeStep> {
    let BridgeSettings {
        host_veth,
        container_veth,
        host_addr,
        container_addr,
        uplink,
        masquerade_subnet,
    } = &config.settings;
    let (host_veth, container_veth, uplink) =
        (host_veth.as_str(), container_veth.as_str(), uplink.as_str());
    let netns = config.netns_name.as_str();
    let run = |description: &'static str, command: CommandLine| BridgeStep::Run {
        description,
        command,
    };

    vec![
        run(
            "create a veth pair",
            config
                .ip()
                .args(["link", "add", host_veth, "type", "veth", "peer", "name", container_veth]),
        ),
        BridgeStep::PublishNamespace {
            dir: config.netns_dir.clone(),
            link: config.netns_dir.join(&config.netns_name),
            target: PathBuf::from(format!("/proc/{}/ns/net", config.target_pid)),
        },
        run(
            "move the container endpoint into the namespace",
            config
                .ip()
                .args(["link", "set", container_veth, "netns", netns]),
        ),
        run(
            "assign the host endpoint address",
            config.ip().args(["addr", "add", host_addr.as_str(), "dev", host_veth]),
        ),
        run(
            "assign the container endpoint address",
            config
                .ip_in_netns()
                .args(["addr", "add", container_addr.as_str(), "dev", container_veth]),
        ),
        run(
            "bring up the host endpoint",
            config.ip().args(["link", "set", host_veth, "up"]),
        ),
        run(
            "bring up the container endpoint",
            config.ip_in_netns().args(["link", "set", container_veth, "up"]),
        ),
        run(
            "bring up the namespace loopback",
            config.ip_in_netns().args(["link", "set", "lo", "up"]),
        ),
        run(
            "allow forwarding from the veth to the uplink",
            config
                .iptables()
                .args(["-A", "FORWARD", "-o", uplink, "-i", host_veth, "-j", "ACCEPT"]),
        ),
        run(
            "allow forwarding from the uplink to the veth",
            config
                .iptables()
                .args(["-A", "FORWARD", "-i", uplink, "-o", host_veth, "-j", "ACCEPT"]),
        ),
        run(
            "masquerade the workspace subnet",
            config.iptables().args([
                "-t",
                "nat",
                "-A",
                "POSTROUTING",
                "-s",
                masquerade_subnet.as_str(),
                "-o",
                uplink,
                "-j",
                "MASQUERADE",
            ]),
        ),
    ]
}

/// Creates the veth pair, publishes the namespace, and installs NAT.
///
/// # Errors
///
/// Returns [`NsopsError::Command`] for the first failing step, carrying its
/// argument vector and captured output. Later steps are not attempted.
pub fn setup_veth_pair(
    kernel: &dyn Kernel,
    runner: &dyn CommandRunner,
    config: &NetworkBridgeConfig,
) -> Result<()> {
    let steps = plan(config);
    let total = steps.len();
    for (index, step) in steps.iter().enumerate() {
        tracing::debug!(step = index + 1, total, description = step.description(), "network step");
        step.execute(kernel, runner)?;
    }
    tracing::info!(
        pid = config.target_pid,
        netns = %config.netns_name,
        host = %config.settings.host_veth,
        container = %config.settings.container_veth,
        "veth pair set up"
    );
    Ok(())
}
