// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch.
pub type Timestamp = i64;

/// Current wall-clock time as a [`Timestamp`].
pub fn now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

/// Derived status of a workflow.
///
/// Never stored on its own; computed from the job timestamps and the
/// `stopped` flag every time it is asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Failed,
    Running,
    Finished,
    Stopped,
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Finished => "finished",
            WorkflowStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Reference to a record in the embedding application's domain.
///
/// Used both as a workflow's linked record (uniqueness scope) and as the
/// subject of [`JobContext::track`].
///
/// [`JobContext::track`]: crate::dag::JobContext::track
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRef {
    pub record_type: String,
    pub id: i64,
}

impl RecordRef {
    pub fn new(record_type: impl Into<String>, id: i64) -> Self {
        Self {
            record_type: record_type.into(),
            id,
        }
    }
}

/// Log level accepted by [`init_logging`](crate::logging::init_logging).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!(
                "invalid log level: {other} (expected error, warn, info, debug or trace)"
            )),
        }
    }
}
