//! Failures of external audio tools.

use cadence_core::error::{AppError, ErrorKind};
use thiserror::Error;

/// Errors from running or interpreting an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The executable could not be started.
    #[error("{tool} could not be started: {source}")]
    Spawn {
        /// Program name.
        tool: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The tool ran past its deadline and was killed.
    #[error("{tool} timed out after {seconds}s")]
    Timeout {
        /// Program name.
        tool: String,
        /// Deadline that elapsed.
        seconds: u64,
    },

    /// The tool exited unsuccessfully.
    #[error("{tool} exited with code {code}: {stderr}")]
    Failed {
        /// Program name.
        tool: String,
        /// Exit code (-1 when killed by a signal).
        code: i32,
        /// Tail of standard error.
        stderr: String,
    },

    /// The tool succeeded but its output could not be understood.
    #[error("unexpected {tool} output: {message}")]
    Parse {
        /// Program name.
        tool: String,
        /// What was wrong.
        message: String,
    },

    /// Filesystem error while preparing output locations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Build a parse error.
    pub fn parse(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

impl From<ToolError> for AppError {
    fn from(err: ToolError) -> Self {
        let kind = match &err {
            ToolError::Timeout { .. } => ErrorKind::Timeout,
            ToolError::Io(_) => ErrorKind::Storage,
            _ => ErrorKind::ExternalTool,
        };
        AppError::with_source(kind, err.to_string(), err)
    }
}
