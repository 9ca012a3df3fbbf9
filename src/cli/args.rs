//! CLI argument parsing

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::backend::IsolationKind;
use crate::config::{ISOLATION_ENV, STORE_ENV};

#[derive(Parser, Debug)]
#[command(name = "polythene")]
#[command(
    author,
    version,
    about = "Export container images to rootfs trees and run commands inside them",
    long_about = None
)]
pub struct Args {
    #[command(subcommand)]
    pub command: SubCommand,

    /// Print progress logs to stderr (also POLYTHENE_VERBOSE)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Options shared by every subcommand
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Directory to store UUID rootfs trees
    #[arg(short, long, env = STORE_ENV, value_name = "DIR")]
    pub store: Option<PathBuf>,

    /// Timeout in seconds for each external command
    #[arg(short, long, value_name = "SECONDS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum SubCommand {
    /// Pull IMAGE, export it into STORE/UUID and print the UUID
    Pull {
        /// Image reference, e.g. docker.io/library/busybox:latest
        image: String,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Run a command inside a UUID's rootfs, trying bubblewrap, proot, then chroot
    Exec {
        /// UUID of the exported filesystem (from `polythene pull`)
        uuid: String,

        #[command(flatten)]
        common: CommonArgs,

        /// Backend to probe first; the others are tried afterwards in priority order
        #[arg(short, long, value_enum, env = ISOLATION_ENV)]
        isolation: Option<IsolationKind>,

        /// Command and arguments to execute inside the rootfs, after `--`
        #[arg(last = true, value_name = "CMD")]
        command: Vec<String>,
    },
}
