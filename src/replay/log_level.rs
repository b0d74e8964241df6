use clap::ValueEnum;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logging level for a replay run.
///
/// Controls the verbosity of log output, from errors only to detailed
/// trace information about every registration and deferred dispatch.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, ValueEnum, PartialEq, Eq, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only failures, such as listeners that panicked.
    Error,

    /// Warnings and errors.
    Warn,

    /// Informational messages about the run itself (default level).
    #[default]
    Info,

    /// Listener registration, removal, wake and sleep.
    Debug,

    /// Everything, including coalesced dispatches.
    Trace,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Trace => write!(f, "trace"),
        }
    }
}
