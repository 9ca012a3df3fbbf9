//! Execute external commands with logging, capture and timeouts

use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use super::command::{Invocation, ToolCommand};
use crate::error::{PolytheneError, Result};

/// Where a foreground command's stdout goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdoutTarget {
    #[default]
    Inherit,
    /// Send child stdout to our stderr, keeping our stdout for results
    Stderr,
}

/// How the runner executes an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunOptions {
    /// Share the caller's standard streams instead of capturing output
    pub foreground: bool,
    /// Kill the command after this many seconds
    pub timeout: Option<u64>,
    pub stdout: StdoutTarget,
}

impl RunOptions {
    pub fn foreground() -> Self {
        Self {
            foreground: true,
            ..Self::default()
        }
    }

    pub fn captured() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Option<u64>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn stdout_to_stderr(mut self) -> Self {
        self.stdout = StdoutTarget::Stderr;
        self
    }
}

/// Result of a successful run. Buffers are empty in foreground mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

type PipeReader = thread::JoinHandle<io::Result<Vec<u8>>>;

/// Echo `invocation` to stderr and run it.
///
/// Non-zero exits come back as [`PolytheneError::CommandFailed`], a fired
/// timeout as [`PolytheneError::Timeout`] and launch failures as
/// [`PolytheneError::Spawn`]. Malformed commands and conflicting timeouts are
/// rejected before anything is launched.
pub fn run_cmd(invocation: impl Into<Invocation>, options: &RunOptions) -> Result<Output> {
    let invocation = invocation.into();
    invocation.validate()?;
    let timeout = merge_timeout(invocation.bound_timeout(), options.timeout)?;

    eprintln!("$ {}", invocation);

    match &invocation {
        Invocation::Single(cmd) => run_single(cmd, options, timeout),
        Invocation::Pipeline(stages) => run_pipeline(stages, options, timeout),
    }
}

/// Combine a timeout bound to the command with one requested by the caller.
pub fn merge_timeout(bound: Option<u64>, requested: Option<u64>) -> Result<Option<u64>> {
    match (bound, requested) {
        (Some(bound), Some(requested)) => {
            Err(PolytheneError::TimeoutConflict { bound, requested })
        }
        (bound, requested) => Ok(bound.or(requested)),
    }
}

/// Locate `name` on `PATH`
pub fn find_command(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Locate a tool the operation cannot proceed without
pub fn require_command(name: &str) -> Result<PathBuf> {
    find_command(name).ok_or_else(|| PolytheneError::ToolNotFound(name.to_string()))
}

fn stdout_stdio(options: &RunOptions) -> Stdio {
    if !options.foreground {
        return Stdio::piped();
    }
    match options.stdout {
        StdoutTarget::Inherit => Stdio::inherit(),
        StdoutTarget::Stderr => Stdio::from(io::stderr()),
    }
}

fn stderr_stdio(options: &RunOptions) -> Stdio {
    if options.foreground {
        Stdio::inherit()
    } else {
        Stdio::piped()
    }
}

fn run_single(cmd: &ToolCommand, options: &RunOptions, timeout: Option<u64>) -> Result<Output> {
    let mut command = cmd.to_command();
    command.stdout(stdout_stdio(options)).stderr(stderr_stdio(options));
    if !options.foreground {
        command.stdin(Stdio::null());
    }

    let mut child = command.spawn().map_err(|source| PolytheneError::Spawn {
        program: cmd.program().to_string(),
        source,
    })?;

    let stdout_handle = spawn_pipe_reader(child.stdout.take());
    let stderr_handle = spawn_pipe_reader(child.stderr.take());

    let deadline = deadline_for(timeout);
    let status = match wait_until(&mut child, deadline)? {
        Some(status) => status,
        None => {
            kill_and_reap(&mut child);
            return Err(PolytheneError::Timeout {
                command: cmd.to_string(),
                seconds: timeout.unwrap_or_default(),
            });
        }
    };

    let stdout = collect_pipe(stdout_handle)?;
    let stderr = collect_pipe(stderr_handle)?;
    check_status(cmd, status, &stderr)?;

    Ok(Output {
        status: status.code().unwrap_or(0),
        stdout,
        stderr,
    })
}

fn run_pipeline(
    stages: &[ToolCommand],
    options: &RunOptions,
    timeout: Option<u64>,
) -> Result<Output> {
    let mut children: Vec<Child> = Vec::with_capacity(stages.len());
    let mut stderr_handles = Vec::with_capacity(stages.len());
    let last = stages.len() - 1;

    for (index, stage) in stages.iter().enumerate() {
        let mut command = stage.to_command();
        command.stderr(stderr_stdio(options));

        match children.last_mut().and_then(|prev| prev.stdout.take()) {
            Some(upstream) => {
                command.stdin(Stdio::from(upstream));
            }
            None if !options.foreground => {
                command.stdin(Stdio::null());
            }
            None => {}
        }

        if index == last {
            command.stdout(stdout_stdio(options));
        } else {
            command.stdout(Stdio::piped());
        }

        match command.spawn() {
            Ok(mut child) => {
                stderr_handles.push(spawn_pipe_reader(child.stderr.take()));
                children.push(child);
            }
            Err(source) => {
                for child in children.iter_mut() {
                    kill_and_reap(child);
                }
                return Err(PolytheneError::Spawn {
                    program: stage.program().to_string(),
                    source,
                });
            }
        }
    }

    let stdout_handle = spawn_pipe_reader(children[last].stdout.take());
    let deadline = deadline_for(timeout);
    let mut statuses = Vec::with_capacity(children.len());

    for index in 0..children.len() {
        match wait_until(&mut children[index], deadline)? {
            Some(status) => statuses.push(status),
            None => {
                for child in children.iter_mut() {
                    kill_and_reap(child);
                }
                return Err(PolytheneError::Timeout {
                    command: Invocation::Pipeline(stages.to_vec()).to_string(),
                    seconds: timeout.unwrap_or_default(),
                });
            }
        }
    }

    let stdout = collect_pipe(stdout_handle)?;
    let mut stderr = String::new();
    for handle in stderr_handles {
        stderr.push_str(&collect_pipe(handle)?);
    }

    for (stage, status) in stages.iter().zip(&statuses) {
        check_status(stage, *status, &stderr)?;
    }

    Ok(Output {
        status: 0,
        stdout,
        stderr,
    })
}

fn check_status(cmd: &ToolCommand, status: ExitStatus, stderr: &str) -> Result<()> {
    if status.success() {
        return Ok(());
    }
    Err(PolytheneError::CommandFailed {
        command: cmd.to_string(),
        code: status.code(),
        stderr: stderr.trim_end().to_string(),
    })
}

fn deadline_for(timeout: Option<u64>) -> Option<Instant> {
    timeout.map(|secs| Instant::now() + Duration::from_secs(secs))
}

fn wait_until(child: &mut Child, deadline: Option<Instant>) -> Result<Option<ExitStatus>> {
    let status = match deadline {
        Some(deadline) => {
            child.wait_timeout(deadline.saturating_duration_since(Instant::now()))?
        }
        None => Some(child.wait()?),
    };
    Ok(status)
}

fn kill_and_reap(child: &mut Child) {
    // Already-exited children make kill() fail; only the reap matters.
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_pipe_reader<R>(pipe: Option<R>) -> Option<PipeReader>
where
    R: Read + Send + 'static,
{
    pipe.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            stream.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn collect_pipe(handle: Option<PipeReader>) -> Result<String> {
    match handle {
        Some(handle) => {
            let bytes = handle
                .join()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "pipe reader thread panicked"))??;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        None => Ok(String::new()),
    }
}
