//! Image export through podman and tar

use std::path::Path;

use chrono::Utc;

use crate::config::Config;
use crate::error::{PolytheneError, Result};
use crate::process::{require_command, run_cmd, RunOptions, ToolCommand};
use crate::store;

/// Container engine binary
pub const ENGINE: &str = "podman";
/// Archive tool the export is streamed into
pub const ARCHIVE_TOOL: &str = "tar";

/// Removes a stopped container when dropped.
///
/// Removal is best-effort: its failure is logged and otherwise ignored.
struct ContainerGuard<'a> {
    engine: &'a ToolCommand,
    id: String,
    timeout: Option<u64>,
}

impl ContainerGuard<'_> {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ContainerGuard<'_> {
    fn drop(&mut self) {
        let rm = self.engine.clone().args(["rm", self.id.as_str()]);
        let options = RunOptions::foreground()
            .stdout_to_stderr()
            .with_timeout(self.timeout);
        if let Err(e) = run_cmd(rm, &options) {
            log::warn!("Could not remove container {}: {}", self.id, e);
        }
    }
}

/// Export `image`'s filesystem into `dest`.
///
/// `dest` must not exist yet; [`PolytheneError::DestinationExists`] lets the
/// caller pick a new identifier. The stopped container used for the export is
/// removed whether or not the export succeeds.
pub fn export_rootfs(
    config: &Config,
    image: &str,
    dest: &Path,
    timeout: Option<u64>,
) -> Result<()> {
    let engine_path = require_command(ENGINE)?;
    let tar_path = require_command(ARCHIVE_TOOL)?;

    let engine = ToolCommand::new(engine_path.to_string_lossy())
        .envs(config.engine_env.iter().cloned());
    let tar = ToolCommand::new(tar_path.to_string_lossy());
    let foreground = RunOptions::foreground()
        .stdout_to_stderr()
        .with_timeout(timeout);

    // Pull explicitly so exec never needs the network later
    log::info!("Pulling {} ...", image);
    run_cmd(engine.clone().args(["pull", image]), &foreground).map_err(|e| {
        PolytheneError::Pull {
            image: image.to_string(),
            source: Box::new(e),
        }
    })?;

    store::create_rootfs_dir(dest)?;

    let created = run_cmd(
        engine.clone().args(["create", "--pull=never", image, "true"]),
        &RunOptions::captured().with_timeout(timeout),
    )
    .map_err(|e| PolytheneError::Create {
        image: image.to_string(),
        source: Box::new(e),
    })?;

    let container = ContainerGuard {
        engine: &engine,
        id: created.stdout.trim().to_string(),
        timeout,
    };

    log::info!("Exporting rootfs of {} -> {}", container.id(), dest.display());
    let dest_arg = dest.to_string_lossy();
    let pipeline = engine
        .clone()
        .args(["export", container.id()])
        .pipe(tar.args(["-C", dest_arg.as_ref(), "-x"]));
    run_cmd(pipeline, &foreground).map_err(|e| PolytheneError::Export {
        container: container.id().to_string(),
        dest: dest.to_path_buf(),
        source: Box::new(e),
    })?;
    drop(container);

    if let Err(e) = store::write_metadata(dest, image, Utc::now()) {
        log::debug!("Skipping metadata for {}: {}", dest.display(), e);
    }

    Ok(())
}
