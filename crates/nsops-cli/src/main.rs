//! # nsops: namespace operations helper
//!
//! Performs exactly one privileged operation per invocation: mount-tree
//! transfer, overlay/shiftfs/proc/sysfs mounts, device provisioning, or
//! veth/NAT setup. The orchestrator re-executes this binary inside the
//! namespaces it wants the operation to act on.

mod commands;
mod logging;

use std::ffi::OsString;
use std::process::ExitCode;

use clap::Parser;
use nsops_common::types::InstanceId;

use crate::commands::Cli;

fn main() -> ExitCode {
    let argv: Vec<OsString> = std::env::args_os().collect();
    let args: Vec<String> = argv.iter().map(|a| a.to_string_lossy().into_owned()).collect();
    let instance_id = InstanceId::from_env();

    let cli = match Cli::try_parse_from(&argv) {
        Ok(cli) => cli,
        // --help and --version
        Err(e) if !e.use_stderr() => e.exit(),
        Err(e) => {
            logging::init(logging::LogFormat::requested(&args));
            tracing::error!(
                instance_id = %instance_id,
                args = ?args,
                kind = %e.kind(),
                error = %e.to_string().trim_end(),
                "invalid invocation"
            );
            e.exit()
        }
    };

    logging::init(cli.global.log_format);
    match commands::execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(
                instance_id = %instance_id,
                args = ?args,
                error = %format!("{e:#}"),
                "{} failed",
                nsops_common::constants::BIN_NAME
            );
            ExitCode::FAILURE
        }
    }
}
