//! External helper execution.
//!
//! The overlay mounter and the networking tools are run as child processes.
//! Their standard output and standard error share one pipe so the captured
//! text keeps the order in which the helper wrote it.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use nix::fcntl::OFlag;
use nix::unistd::pipe2;
use nsops_common::error::{NsopsError, Result};

/// A fully specified helper invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
}

impl CommandLine {
    /// Starts a command line for `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory of the child.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Program path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments after the program.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Working directory, if one was set.
    pub fn working_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Full argument vector, program first.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.display().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}

/// Result of a helper that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Interleaved standard output and standard error.
    pub output: String,
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Whether the helper exited with status zero.
    pub const fn success(&self) -> bool {
        matches!(self.exit_code, Some(0))
    }

    fn status(&self) -> String {
        self.exit_code.map_or_else(
            || "terminated by signal".to_owned(),
            |code| format!("exit status: {code}"),
        )
    }
}

/// Runs external helpers.
pub trait CommandRunner {
    /// Runs `command` to completion and captures its combined output.
    ///
    /// # Errors
    ///
    /// Returns an error only if the helper could not be started or its
    /// output could not be collected; a non-zero exit is not an error here.
    fn run(&self, command: &CommandLine) -> Result<CommandOutput>;

    /// Runs `command` as the named step and requires a zero exit status.
    ///
    /// Every failure, including a failed spawn, becomes
    /// [`NsopsError::Command`] carrying the argument vector and the output.
    ///
    /// # Errors
    ///
    /// See above.
    fn run_step(&self, step: &str, command: &CommandLine) -> Result<String> {
        tracing::debug!(step, command = %command, "running helper");
        match self.run(command) {
            Ok(out) if out.success() => Ok(out.output),
            Ok(out) => Err(NsopsError::Command {
                step: step.to_owned(),
                command: command.argv(),
                status: out.status(),
                output: out.output,
            }),
            Err(e) => Err(NsopsError::Command {
                step: step.to_owned(),
                command: command.argv(),
                output: String::new(),
                status: e.to_string(),
            }),
        }
    }
}

/// Spawns real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandLine) -> Result<CommandOutput> {
        let io_err = |source: std::io::Error| NsopsError::Io {
            path: command.program.clone(),
            source,
        };

        let (reader, writer) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| NsopsError::syscall("pipe2", &command.program, e))?;
        let writer_err = writer.try_clone().map_err(io_err)?;

        // The Command owns the write ends; it must be dropped before reading
        // or the pipe never reports EOF.
        let mut child = {
            let mut cmd = Command::new(&command.program);
            let _ = cmd
                .args(&command.args)
                .stdin(Stdio::null())
                .stdout(Stdio::from(writer))
                .stderr(Stdio::from(writer_err));
            if let Some(dir) = &command.current_dir {
                let _ = cmd.current_dir(dir);
            }
            cmd.spawn().map_err(io_err)?
        };

        let mut raw = Vec::new();
        let read = File::from(reader).read_to_end(&mut raw);
        let status = child.wait().map_err(io_err)?;
        let _ = read.map_err(io_err)?;

        Ok(CommandOutput {
            output: String::from_utf8_lossy(&raw).into_owned(),
            exit_code: status.code(),
        })
    }
}
