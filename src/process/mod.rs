//! Process runner for external tools
//!
//! Every external program polythene drives (the container engine, tar and the
//! isolation tools) goes through [`run_cmd`], which echoes the command line to
//! stderr, runs it captured or in the foreground and normalises the outcome.

mod command;
mod runner;
pub mod shell;

pub use command::{Invocation, ToolCommand};
pub use runner::{
    find_command, merge_timeout, require_command, run_cmd, Output, RunOptions, StdoutTarget,
};
