//! Command descriptions handed to the runner

use std::fmt;
use std::process::Command;

use super::shell;
use crate::error::{PolytheneError, Result};

/// An external program plus its argument vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    timeout: Option<u64>,
}

impl ToolCommand {
    /// Create a command running `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout: None,
        }
    }

    /// Build a command from a full argv, program first
    pub fn from_argv<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or_else(|| {
            PolytheneError::MalformedCommand(
                "commands must be given as a non-empty argument sequence".to_string(),
            )
        })?;
        Ok(Self::new(program).args(argv))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set environment variables for the child only
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Bind a timeout in seconds to this command.
    ///
    /// Passing another timeout through `RunOptions` as well is rejected by
    /// the runner.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_timeout(&self) -> Option<u64> {
        self.timeout
    }

    /// The complete argv, program first
    pub fn formulate(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }

    /// Pipe this command's stdout into `next`
    pub fn pipe(self, next: ToolCommand) -> Invocation {
        Invocation::Pipeline(vec![self, next])
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(PolytheneError::MalformedCommand(
                "command has an empty program name".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for (key, value) in &self.env {
            command.env(key, value);
        }
        command
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell::join(&self.formulate()))
    }
}

/// What the runner executes: one command, or a pipeline streaming each
/// stage's stdout into the next stage's stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Single(ToolCommand),
    Pipeline(Vec<ToolCommand>),
}

impl Invocation {
    pub fn stages(&self) -> &[ToolCommand] {
        match self {
            Invocation::Single(cmd) => std::slice::from_ref(cmd),
            Invocation::Pipeline(stages) => stages,
        }
    }

    /// Timeout bound to the command itself, taken from the first stage that has one
    pub fn bound_timeout(&self) -> Option<u64> {
        self.stages().iter().find_map(ToolCommand::get_timeout)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Invocation::Pipeline(stages) = self {
            if stages.len() < 2 {
                return Err(PolytheneError::MalformedCommand(format!(
                    "a pipeline needs at least two stages, got {}",
                    stages.len()
                )));
            }
        }
        self.stages().iter().try_for_each(ToolCommand::validate)
    }
}

impl From<ToolCommand> for Invocation {
    fn from(cmd: ToolCommand) -> Self {
        Invocation::Single(cmd)
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.stages().iter().map(ToString::to_string).collect();
        write!(f, "{}", rendered.join(" | "))
    }
}
