//! Subscriber setup.
//!
//! Logs go to stderr so they end up in the orchestrator's log pipeline
//! next to the helper output it already captures.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable lines.
    Text,
}

impl LogFormat {
    /// Finds `--log-format` in a command line that clap rejected.
    ///
    /// The last valid occurrence wins; anything unparseable falls back to
    /// the default.
    pub fn requested(args: &[String]) -> Self {
        let mut found = None;
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            let value = match arg.strip_prefix("--log-format") {
                Some("") => iter.next().map(String::as_str),
                Some(rest) => rest.strip_prefix('='),
                None => None,
            };
            if let Some(format) = value.and_then(|v| <Self as ValueEnum>::from_str(v, false).ok()) {
                found = Some(format);
            }
        }
        found.unwrap_or_default()
    }
}

/// Installs the global subscriber, filtered by `RUST_LOG` (default `info`).
///
/// A second call is a no-op.
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.with_target(false).try_init(),
    };
}
