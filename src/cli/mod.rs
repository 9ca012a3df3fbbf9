//! Command-line interface

mod args;
pub mod commands;

pub use args::{Args, CommonArgs, SubCommand};
pub use commands::{cmd_exec, cmd_pull};
