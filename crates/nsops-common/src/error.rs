//! Unified error types for the nsops workspace.
//!
//! Every failure of a privileged action maps onto one of these variants.
//! Nothing is retried locally: the error travels to the process boundary,
//! where it becomes a fatal log line and a non-zero exit status.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum NsopsError {
    /// A required parameter is missing or malformed.
    ///
    /// Raised before any syscall or helper process runs.
    #[error("invalid arguments for {action}: {message}")]
    Validation {
        /// Name of the action being validated.
        action: &'static str,
        /// Description of the offending parameter.
        message: String,
    },

    /// A mount-family or device syscall returned an error number.
    #[error("{call} on {target} failed: {source}")]
    Syscall {
        /// Name of the kernel call.
        call: &'static str,
        /// Path the call operated on.
        target: PathBuf,
        /// Raw kernel error number.
        source: Errno,
    },

    /// An external helper exited unsuccessfully or could not be spawned.
    #[error("{step} ({command:?}) failed: {output:?}\n{status}")]
    Command {
        /// Human-readable description of the step.
        step: String,
        /// Full argument vector of the failing command.
        command: Vec<String>,
        /// Combined standard output and error of the helper.
        output: String,
        /// Exit status or spawn error.
        status: String,
    },

    /// Descriptor hand-off over the ancillary-data channel failed.
    #[error("mount handle transfer failed during {operation}: {message}")]
    Transfer {
        /// Protocol operation (`send`, `receive`, `adopt`).
        operation: &'static str,
        /// Failure description.
        message: String,
    },

    /// A `prepare-dev` sub-step failed.
    #[error("device preparation step `{step}` failed: {source}")]
    Device {
        /// Name of the failing sub-step.
        step: &'static str,
        /// Underlying failure.
        source: Box<NsopsError>,
    },

    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl NsopsError {
    /// Builds a validation error for the named action.
    pub fn validation(action: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            action,
            message: message.into(),
        }
    }

    /// Builds a syscall error from a kernel error number.
    pub fn syscall(call: &'static str, target: impl Into<PathBuf>, source: Errno) -> Self {
        Self::Syscall {
            call,
            target: target.into(),
            source,
        }
    }

    /// Returns the kernel error number if this is a syscall failure.
    #[must_use]
    pub const fn errno(&self) -> Option<Errno> {
        match self {
            Self::Syscall { source, .. } => Some(*source),
            _ => None,
        }
    }

    /// Whether the failure means the object being created already exists.
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        match self {
            Self::Syscall { source, .. } => *source == Errno::EEXIST,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::AlreadyExists,
            _ => false,
        }
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, NsopsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_embeds_argv_and_output() {
        let err = NsopsError::Command {
            step: "create a veth pair".into(),
            command: vec!["/usr/sbin/ip".into(), "link".into(), "add".into()],
            output: "RTNETLINK answers: File exists\n".into(),
            status: "exit status: 2".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains(r#"["/usr/sbin/ip", "link", "add"]"#), "{msg}");
        assert!(msg.contains("File exists"), "{msg}");
        assert!(msg.contains("exit status: 2"), "{msg}");
    }

    #[test]
    fn syscall_error_exposes_errno() {
        let err = NsopsError::syscall("mount", "/proc", Errno::EPERM);
        assert_eq!(err.errno(), Some(Errno::EPERM));
        assert!(err.to_string().starts_with("mount on /proc failed"));
    }

    #[test]
    fn device_error_names_step() {
        let inner = NsopsError::syscall("mknod", "/dev/fuse", Errno::EPERM);
        let err = NsopsError::Device {
            step: "fuse",
            source: Box::new(inner),
        };
        assert!(err.to_string().contains("`fuse`"));
        assert_eq!(err.errno(), None);
    }

    #[test]
    fn already_exists_covers_errno_and_io() {
        assert!(NsopsError::syscall("mknod", "/dev/net/tun", Errno::EEXIST).is_already_exists());
        assert!(!NsopsError::syscall("mknod", "/dev/net/tun", Errno::EPERM).is_already_exists());
        let io = NsopsError::Io {
            path: "/dev/kmsg".into(),
            source: std::io::Error::from(std::io::ErrorKind::AlreadyExists),
        };
        assert!(io.is_already_exists());
    }
}
