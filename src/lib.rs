//! polythene - run commands inside exported container filesystems
//!
//! `pull` exports an image's root filesystem with podman and tar into
//! `STORE/UUID`. `exec` runs a command inside that tree using the strongest
//! isolation the host allows: bubblewrap, then proot, then chroot.
//!
//! # Example
//!
//! ```no_run
//! use polythene::{cmd_exec, cmd_pull, Config, SystemToolbox};
//!
//! let config = Config::from_env();
//! let uuid = cmd_pull(&config, "docker.io/library/busybox:latest", None).unwrap();
//! let command = vec!["echo".to_string(), "hello".to_string()];
//! let code = cmd_exec(&config, &uuid, &command, None, None, &SystemToolbox).unwrap();
//! assert_eq!(code, 0);
//! ```

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod process;
pub mod session;
pub mod store;

pub use backend::{IsolationKind, SystemToolbox, Toolbox, BACKENDS};
pub use cli::{cmd_exec, cmd_pull};
pub use config::Config;
pub use error::{PolytheneError, Result};
pub use session::{LocalSandbox, PolytheneSession, SandboxRunner, SessionCommand};
