//! How the selection protocol reaches the outside world

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{normalise_retcode, PolytheneError, Result};
use crate::process::{find_command, run_cmd, RunOptions, ToolCommand};

/// Outcome of running a probe through a backend's binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The tool could not run at all (launch failure, timeout)
    Unavailable(String),
    /// The tool ran and rejected the probe
    Failed(i32),
    Succeeded,
}

impl ProbeOutcome {
    pub fn is_usable(&self) -> bool {
        matches!(self, ProbeOutcome::Succeeded)
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Unavailable(reason) => write!(f, "unavailable: {}", reason),
            ProbeOutcome::Failed(code) => write!(f, "exited with status {}", code),
            ProbeOutcome::Succeeded => write!(f, "ok"),
        }
    }
}

/// Binary lookup and execution used by backend selection
pub trait Toolbox {
    /// Find `binary` on this system
    fn resolve(&self, binary: &str) -> Option<PathBuf>;

    /// Run a side-effect free probe. Never fails, every problem is an outcome.
    fn probe(&self, tool: &Path, args: &[String], timeout: Option<u64>) -> ProbeOutcome;

    /// Run the real command in the foreground and return its exit code.
    ///
    /// A non-zero exit is still `Ok`. Errors are reserved for commands that
    /// could not run to completion (launch failure, timeout).
    fn execute(&self, tool: &Path, args: &[String], timeout: Option<u64>) -> Result<i32>;
}

/// Toolbox backed by `PATH` lookup and real child processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolbox;

fn tool_command(tool: &Path, args: &[String]) -> ToolCommand {
    ToolCommand::new(tool.to_string_lossy()).args(args.iter().cloned())
}

impl Toolbox for SystemToolbox {
    fn resolve(&self, binary: &str) -> Option<PathBuf> {
        find_command(binary)
    }

    fn probe(&self, tool: &Path, args: &[String], timeout: Option<u64>) -> ProbeOutcome {
        let options = RunOptions::captured().with_timeout(timeout);
        match run_cmd(tool_command(tool, args), &options) {
            Ok(_) => ProbeOutcome::Succeeded,
            Err(PolytheneError::CommandFailed { code, stderr, .. }) => {
                if !stderr.is_empty() {
                    log::debug!("{}: {}", tool.display(), stderr);
                }
                ProbeOutcome::Failed(normalise_retcode(code))
            }
            Err(other) => ProbeOutcome::Unavailable(other.to_string()),
        }
    }

    fn execute(&self, tool: &Path, args: &[String], timeout: Option<u64>) -> Result<i32> {
        let options = RunOptions::foreground().with_timeout(timeout);
        match run_cmd(tool_command(tool, args), &options) {
            Ok(output) => Ok(output.status),
            Err(PolytheneError::CommandFailed { code, .. }) => Ok(normalise_retcode(code)),
            Err(other) => Err(other),
        }
    }
}
