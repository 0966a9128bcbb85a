//! Domain primitive types used across the nsops workspace.

use std::fmt;

/// Identifier of the workspace instance an invocation acts on behalf of.
///
/// Only ever attached to diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InstanceId(String);

impl InstanceId {
    /// Placeholder used when the orchestrator did not supply an identifier.
    pub const UNKNOWN: &'static str = "unknown";

    /// Reads the identifier from the environment.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_value(std::env::var(crate::constants::INSTANCE_ID_ENV).ok())
    }

    fn from_value(value: Option<String>) -> Self {
        match value {
            Some(v) if !v.trim().is_empty() => Self(v),
            _ => Self(Self::UNKNOWN.to_owned()),
        }
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
