//! Argument vectors for each isolation tool
//!
//! Everything here is pure: given the rootfs, the inner command and what the
//! host allows, return the argv handed to the tool binary.

use std::path::Path;

/// Shell every backend runs inside the rootfs
pub const SHELL: &str = "/bin/sh";
/// Non-login command flag. `-lc` would source profile scripts and change the environment.
pub const SHELL_FLAG: &str = "-c";
/// No-op used by probes
pub const PROBE_COMMAND: &str = "true";
/// chroot targets may not set a PATH of their own
pub const CHROOT_PATH_EXPORT: &str = "export PATH=/bin:/sbin:/usr/bin:/usr/sbin";

/// Host features detected for bubblewrap before probing it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Unprivileged user namespaces with uid/gid 0 mapping work
    pub user_namespace: bool,
    /// A private `/proc` can be mounted
    pub private_proc: bool,
}

/// Probe and execute argv for one backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgVectors {
    pub probe: Vec<String>,
    pub execute: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn shell_invocation(command: &str) -> Vec<String> {
    vec![SHELL.to_string(), SHELL_FLAG.to_string(), command.to_string()]
}

/// `bwrap` argv that checks whether user namespaces can be created
pub fn bwrap_userns_probe() -> Vec<String> {
    strings(&[
        "--unshare-user",
        "--uid",
        "0",
        "--gid",
        "0",
        "--bind",
        "/",
        "/",
        PROBE_COMMAND,
    ])
}

/// Namespace flags bubblewrap always gets, plus user namespace mapping when allowed
pub fn bwrap_base_flags(user_namespace: bool) -> Vec<String> {
    let mut flags = Vec::new();
    if user_namespace {
        flags.extend(strings(&["--unshare-user", "--uid", "0", "--gid", "0"]));
    }
    flags.extend(strings(&["--unshare-pid", "--unshare-ipc", "--unshare-uts"]));
    flags
}

/// `bwrap` argv that checks whether a private `/proc` may be mounted
pub fn bwrap_proc_probe(base_flags: &[String], root: &Path) -> Vec<String> {
    let mut args = base_flags.to_vec();
    args.extend([
        "--bind".to_string(),
        path_arg(root),
        "/".to_string(),
        "--proc".to_string(),
        "/proc".to_string(),
        PROBE_COMMAND.to_string(),
    ]);
    args
}

fn bwrap_vector(
    root: &Path,
    container_tmp: &Path,
    caps: Capabilities,
    command: &str,
) -> Vec<String> {
    let mut args = bwrap_base_flags(caps.user_namespace);
    args.extend([
        "--bind".to_string(),
        path_arg(root),
        "/".to_string(),
        "--dev-bind".to_string(),
        "/dev".to_string(),
        "/dev".to_string(),
    ]);
    if caps.private_proc {
        args.extend(strings(&["--proc", "/proc"]));
    }
    args.extend([
        "--tmpfs".to_string(),
        path_arg(container_tmp),
        "--chdir".to_string(),
        "/".to_string(),
    ]);
    args.extend(shell_invocation(command));
    args
}

pub fn bwrap(root: &Path, inner_cmd: &str, container_tmp: &Path, caps: Capabilities) -> ArgVectors {
    ArgVectors {
        probe: bwrap_vector(root, container_tmp, caps, PROBE_COMMAND),
        execute: bwrap_vector(root, container_tmp, caps, inner_cmd),
    }
}

pub fn proot(root: &Path, inner_cmd: &str) -> ArgVectors {
    let vector = |command: &str| {
        let mut args = vec!["-R".to_string(), path_arg(root), "-0".to_string()];
        args.extend(shell_invocation(command));
        args
    };
    ArgVectors {
        probe: vector(PROBE_COMMAND),
        execute: vector(inner_cmd),
    }
}

pub fn chroot(root: &Path, inner_cmd: &str) -> ArgVectors {
    let vector = |command: &str| {
        let mut args = vec![path_arg(root)];
        args.extend(shell_invocation(command));
        args
    };
    ArgVectors {
        probe: vector(PROBE_COMMAND),
        execute: vector(&format!("{}; {}", CHROOT_PATH_EXPORT, inner_cmd)),
    }
}
