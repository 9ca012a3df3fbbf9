//! Rootfs store layout
//!
//! The store is a plain directory. Each child is named by a UUIDv7 and holds
//! one extracted container filesystem plus an advisory metadata file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{PolytheneError, Result};

/// Advisory metadata written next to an exported filesystem
pub const META_FILE: &str = ".polythene-meta";

/// Directories the sandboxes bind or mount over
pub const RUNTIME_DIRS: [&str; 2] = ["dev", "tmp"];

/// Generate a time-ordered identifier for a new rootfs
pub fn generate_uuid() -> String {
    Uuid::now_v7().to_string()
}

/// Create `path` and its parents if needed
pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

/// Create a fresh rootfs directory, failing if it already exists
pub fn create_rootfs_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(PolytheneError::DestinationExists(path.to_path_buf()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Path of the rootfs for `uuid` under `store`.
///
/// Identifiers are single path components; anything that would escape the
/// store is reported as an unknown rootfs.
pub fn rootfs_path(store: &Path, uuid: &str) -> Result<PathBuf> {
    let path = store.join(uuid);
    if uuid.is_empty() || uuid == "." || uuid == ".." || uuid.contains('/') {
        return Err(PolytheneError::UnknownRootfs {
            uuid: uuid.to_string(),
            path,
        });
    }
    Ok(path)
}

/// Make sure the directories sandboxes expect exist inside `root`
pub fn ensure_runtime_paths(root: &Path) -> Result<()> {
    for sub in RUNTIME_DIRS {
        ensure_directory(&root.join(sub))?;
    }
    Ok(())
}

/// Render the metadata file contents
pub fn format_metadata(image: &str, created: DateTime<Utc>) -> String {
    format!(
        "image={}\ncreated={}\n",
        image,
        created.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

/// Write `.polythene-meta` into `root`
pub fn write_metadata(root: &Path, image: &str, created: DateTime<Utc>) -> io::Result<()> {
    fs::write(root.join(META_FILE), format_metadata(image, created))
}
