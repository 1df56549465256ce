//! Cleanup commands and their execution
//!
//! The core never talks to a cloud provider itself. Each resource carries a
//! command supplied by whoever provisioned it, and teardown runs that.

use std::fmt;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// How long a single cleanup command may run before it is killed
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(600);

/// Poll interval while waiting for a child process
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Program and arguments that tear down one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupCommand {
    pub program: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl CleanupCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Wrap a shell one-liner (`sh -c "<line>"`)
    pub fn shell(line: impl Into<String>) -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), line.into()],
        }
    }

    /// Render for display, shell one-liners as written
    pub fn render(&self) -> String {
        if let [flag, line] = self.args.as_slice() {
            if self.program == "sh" && flag == "-c" {
                return line.clone();
            }
        }
        self.quoted()
    }

    /// Render as one self-contained script step
    ///
    /// Every word is quoted, so a one-liner runs in its own `sh -c` and
    /// cannot exit, comment out or otherwise reach the surrounding script.
    pub fn quoted(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CleanupCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quote a word for POSIX sh if it needs it
pub fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Runs cleanup commands
///
/// # Returns
/// * `Ok(true)` if the command succeeded
/// * `Ok(false)` if it exited non-zero
/// * `Err` on spawn failure or timeout
pub trait CommandRunner {
    fn run(&self, command: &CleanupCommand) -> Result<bool>;
}

/// Runs commands as child processes, output inherited from the caller
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    pub timeout: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

impl ProcessRunner {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for ProcessRunner {
    fn run(&self, command: &CleanupCommand) -> Result<bool> {
        info!(
            cmd = %command.program,
            args = ?command.args,
            timeout_secs = self.timeout.as_secs(),
            "Running cleanup command"
        );

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn command: {}", command.program))?;

        let start = Instant::now();
        loop {
            if let Some(status) = child
                .try_wait()
                .context("Failed waiting for command")?
            {
                if !status.success() {
                    warn!(cmd = %command.program, status = %status, "Cleanup command failed");
                }
                return Ok(status.success());
            }

            if start.elapsed() >= self.timeout {
                warn!(
                    cmd = %command.program,
                    timeout_secs = self.timeout.as_secs(),
                    "Command timed out, killing process"
                );
                if let Err(e) = child.kill() {
                    warn!(error = %e, "Failed to kill timed-out process");
                }
                let _ = child.wait();
                anyhow::bail!(
                    "Command '{}' timed out after {}s",
                    command.program,
                    self.timeout.as_secs()
                );
            }

            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}
