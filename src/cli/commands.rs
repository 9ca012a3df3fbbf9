//! `pull` and `exec` subcommands

use std::path::Path;

use crate::backend::{select_and_run, ExecRequest, IsolationKind, Selection, Toolbox, BACKENDS};
use crate::config::Config;
use crate::error::{PolytheneError, Result};
use crate::image::export_rootfs;
use crate::process::shell;
use crate::store;

/// Pull `image` into a new rootfs and return its identifier
pub fn cmd_pull(config: &Config, image: &str, timeout: Option<u64>) -> Result<String> {
    pull_with(config, image, timeout, store::generate_uuid, export_rootfs)
}

/// [`cmd_pull`] with injectable id generation and export.
///
/// A collision on the generated directory is retried exactly once with a
/// fresh identifier.
pub fn pull_with<G, E>(
    config: &Config,
    image: &str,
    timeout: Option<u64>,
    mut generate: G,
    mut export: E,
) -> Result<String>
where
    G: FnMut() -> String,
    E: FnMut(&Config, &str, &Path, Option<u64>) -> Result<()>,
{
    store::ensure_directory(&config.store)?;

    let mut uuid = generate();
    let mut root = store::rootfs_path(&config.store, &uuid)?;
    match export(config, image, &root, timeout) {
        Err(PolytheneError::DestinationExists(path)) => {
            log::warn!("{} already exists, generating a new identifier", path.display());
            uuid = generate();
            root = store::rootfs_path(&config.store, &uuid)?;
            export(config, image, &root, timeout)?;
        }
        result => result?,
    }

    store::ensure_runtime_paths(&root)?;
    Ok(uuid)
}

/// Run `command` inside the rootfs for `uuid` and return its exit code
pub fn cmd_exec<T: Toolbox>(
    config: &Config,
    uuid: &str,
    command: &[String],
    timeout: Option<u64>,
    isolation: Option<IsolationKind>,
    toolbox: &T,
) -> Result<i32> {
    if command.is_empty() {
        return Err(PolytheneError::NoCommand);
    }

    let root = store::rootfs_path(&config.store, uuid)?;
    if !root.is_dir() {
        return Err(PolytheneError::UnknownRootfs {
            uuid: uuid.to_string(),
            path: root,
        });
    }

    let request = ExecRequest {
        root,
        inner_cmd: shell::join(command),
        timeout,
        preferred: isolation,
    };

    match select_and_run(config, &request, &BACKENDS, toolbox)? {
        Selection::Completed { code, .. } => Ok(code),
        Selection::Exhausted => Err(PolytheneError::NoIsolationAvailable),
    }
}
