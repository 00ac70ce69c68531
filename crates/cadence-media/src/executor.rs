//! Child process execution with deadlines.
//!
//! Tools run with piped output and `kill_on_drop`, so an elapsed deadline
//! drops the pending `output()` future and the process is killed with it.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::ToolError;

/// Characters of stderr kept in [`ToolError::Failed`].
const STDERR_TAIL: usize = 2000;

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    /// Executable name or path.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
}

impl ToolCommand {
    /// Start a command for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument.
    pub fn path(self, path: &Path) -> Self {
        let arg = path.to_string_lossy().into_owned();
        self.arg(arg)
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Short name used in logs and errors.
    pub fn tool_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.clone())
    }
}

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Standard output (lossy UTF-8).
    pub stdout: String,
    /// Standard error (lossy UTF-8).
    pub stderr: String,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

/// Run `command` to completion, or kill it once `deadline` elapses.
pub async fn run(command: &ToolCommand, deadline: Duration) -> Result<ToolOutput, ToolError> {
    let tool = command.tool_name();
    let start = Instant::now();
    debug!(tool = %tool, args = ?command.args, "Running tool");

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(deadline, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(ToolError::Spawn { tool, source }),
        Err(_) => {
            warn!(tool = %tool, deadline_secs = deadline.as_secs(), "Tool timed out");
            return Err(ToolError::Timeout {
                tool,
                seconds: deadline.as_secs(),
            });
        }
    };

    let elapsed = start.elapsed();
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(ToolError::Failed {
            tool,
            code,
            stderr: tail(&stderr, STDERR_TAIL),
        });
    }

    debug!(tool = %tool, elapsed_ms = elapsed.as_millis() as u64, "Tool finished");
    Ok(ToolOutput {
        stdout,
        stderr,
        elapsed,
    })
}

fn tail(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    let count = trimmed.chars().count();
    if count <= max_chars {
        return trimmed.to_string();
    }
    trimmed.chars().skip(count - max_chars).collect()
}
