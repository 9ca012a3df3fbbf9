//! Error types for polythene

use std::path::PathBuf;

use thiserror::Error;

/// Exit code reported when no isolation backend could run the command.
pub const EXIT_NO_ISOLATION: i32 = 126;

/// Exit code reported when a required external tool is missing.
pub const EXIT_TOOL_NOT_FOUND: i32 = 127;

/// Exit code reported when a command is killed by its timeout.
pub const EXIT_TIMEOUT: i32 = 124;

/// Exit code for usage and configuration mistakes.
pub const EXIT_USAGE: i32 = 2;

#[derive(Error, Debug)]
pub enum PolytheneError {
    #[error("Required command not found: {0}")]
    ToolNotFound(String),

    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` failed with {}", describe_code(.code))]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command `{command}` timed out after {seconds}s")]
    Timeout { command: String, seconds: u64 },

    #[error("Timeout given twice: {bound}s on the command, {requested}s by the caller")]
    TimeoutConflict { bound: u64, requested: u64 },

    #[error("Malformed command: {0}")]
    MalformedCommand(String),

    #[error("Destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    #[error("Failed to pull image {image}: {source}")]
    Pull {
        image: String,
        #[source]
        source: Box<PolytheneError>,
    },

    #[error("Failed to create container from {image}: {source}")]
    Create {
        image: String,
        #[source]
        source: Box<PolytheneError>,
    },

    #[error("Failed to export container {container} into {}: {source}", .dest.display())]
    Export {
        container: String,
        dest: PathBuf,
        #[source]
        source: Box<PolytheneError>,
    },

    #[error("No such UUID rootfs: {uuid} ({})", .path.display())]
    UnknownRootfs { uuid: String, path: PathBuf },

    #[error("No command provided")]
    NoCommand,

    #[error("Command must contain at least one token")]
    EmptyCommand,

    #[error("Unsupported isolation backend requested: {0}")]
    UnknownIsolation(String),

    #[error("All isolation modes unavailable (bwrap/proot/chroot).")]
    NoIsolationAvailable,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl PolytheneError {
    /// Process exit code the CLI reports for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            PolytheneError::ToolNotFound(_) => EXIT_TOOL_NOT_FOUND,
            PolytheneError::Spawn { source, .. } => {
                if source.kind() == std::io::ErrorKind::NotFound {
                    EXIT_TOOL_NOT_FOUND
                } else {
                    1
                }
            }
            PolytheneError::CommandFailed { code, .. } => normalise_retcode(*code),
            PolytheneError::Timeout { .. } => EXIT_TIMEOUT,
            PolytheneError::TimeoutConflict { .. }
            | PolytheneError::MalformedCommand(_)
            | PolytheneError::NoCommand
            | PolytheneError::EmptyCommand
            | PolytheneError::UnknownIsolation(_) => EXIT_USAGE,
            PolytheneError::Pull { source, .. }
            | PolytheneError::Create { source, .. }
            | PolytheneError::Export { source, .. } => source.exit_code(),
            PolytheneError::NoIsolationAvailable => EXIT_NO_ISOLATION,
            PolytheneError::DestinationExists(_)
            | PolytheneError::UnknownRootfs { .. }
            | PolytheneError::IoError(_) => 1,
        }
    }
}

/// Map a tool's exit code to a usable process status.
///
/// A missing code (signal death) or a zero code on a failure path both
/// become `1` so a failure is never reported as success.
pub fn normalise_retcode(code: Option<i32>) -> i32 {
    match code {
        None | Some(0) => 1,
        Some(code) => code,
    }
}

fn describe_code(code: &Option<i32>) -> String {
    match *code {
        Some(code) => format!("exit status {}", code),
        None => "no exit status (terminated by signal)".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, PolytheneError>;
