//! Isolation backends
//!
//! polythene knows three ways of entering a rootfs, ordered from the
//! strongest sandbox to the weakest:
//!
//! - **bubblewrap**: fresh user/pid/ipc/uts namespaces, rootfs bound as `/`
//! - **proot**: ptrace-based chroot emulation with fake root
//! - **chroot**: the kernel's own root change, only usable as root
//!
//! [`selection::select_and_run`] walks this list at runtime and uses the
//! first backend whose probe passes.

pub mod args;
pub mod selection;
pub mod toolbox;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;

pub use args::{ArgVectors, Capabilities};
pub use selection::{candidate_order, select_and_run, ExecRequest, Selection};
pub use toolbox::{ProbeOutcome, SystemToolbox, Toolbox};

use crate::error::PolytheneError;

/// Name of an isolation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum IsolationKind {
    Bubblewrap,
    Proot,
    Chroot,
}

impl IsolationKind {
    pub fn name(&self) -> &'static str {
        match self {
            IsolationKind::Bubblewrap => "bubblewrap",
            IsolationKind::Proot => "proot",
            IsolationKind::Chroot => "chroot",
        }
    }
}

impl fmt::Display for IsolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IsolationKind {
    type Err = PolytheneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bubblewrap" => Ok(IsolationKind::Bubblewrap),
            "proot" => Ok(IsolationKind::Proot),
            "chroot" => Ok(IsolationKind::Chroot),
            other => Err(PolytheneError::UnknownIsolation(other.to_string())),
        }
    }
}

/// Immutable description of one isolation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backend {
    pub kind: IsolationKind,
    /// Executable looked up on `PATH`
    pub binary: &'static str,
    /// Only usable when running as root
    pub requires_root: bool,
    /// Create `dev/` and `tmp/` inside the rootfs before probing
    pub ensure_dirs: bool,
}

/// All backends in priority order, strongest isolation first
pub static BACKENDS: [Backend; 3] = [
    Backend {
        kind: IsolationKind::Bubblewrap,
        binary: "bwrap",
        requires_root: false,
        ensure_dirs: true,
    },
    Backend {
        kind: IsolationKind::Proot,
        binary: "proot",
        requires_root: false,
        ensure_dirs: true,
    },
    Backend {
        kind: IsolationKind::Chroot,
        binary: "chroot",
        requires_root: true,
        ensure_dirs: false,
    },
];

impl Backend {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Find out what the host lets this backend do.
    ///
    /// Only bubblewrap has optional features; it runs two cheap probes to see
    /// whether user namespaces and a private `/proc` are permitted.
    pub fn detect_capabilities<T: Toolbox>(
        &self,
        toolbox: &T,
        tool: &Path,
        root: &Path,
        timeout: Option<u64>,
    ) -> Capabilities {
        match self.kind {
            IsolationKind::Bubblewrap => {
                let userns = toolbox.probe(tool, &args::bwrap_userns_probe(), timeout);
                let user_namespace = userns.is_usable();
                if !user_namespace {
                    log::info!("User namespace probe failed: {}", userns);
                }

                let base = args::bwrap_base_flags(user_namespace);
                let private_proc = toolbox
                    .probe(tool, &args::bwrap_proc_probe(&base, root), timeout)
                    .is_usable();
                if !private_proc {
                    log::debug!("bubblewrap cannot mount a private /proc here");
                }

                Capabilities {
                    user_namespace,
                    private_proc,
                }
            }
            IsolationKind::Proot | IsolationKind::Chroot => Capabilities::default(),
        }
    }

    /// Probe and execute argv for running `inner_cmd` inside `root`
    pub fn arg_vectors(
        &self,
        root: &Path,
        inner_cmd: &str,
        container_tmp: &Path,
        caps: Capabilities,
    ) -> ArgVectors {
        match self.kind {
            IsolationKind::Bubblewrap => args::bwrap(root, inner_cmd, container_tmp, caps),
            IsolationKind::Proot => args::proot(root, inner_cmd),
            IsolationKind::Chroot => args::chroot(root, inner_cmd),
        }
    }
}

/// Look up a backend descriptor by kind
pub fn backend_for(kind: IsolationKind) -> &'static Backend {
    match kind {
        IsolationKind::Bubblewrap => &BACKENDS[0],
        IsolationKind::Proot => &BACKENDS[1],
        IsolationKind::Chroot => &BACKENDS[2],
    }
}
