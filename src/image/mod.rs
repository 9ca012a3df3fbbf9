//! Turning container images into plain rootfs trees
//!
//! Images are pulled with podman, materialised as a stopped container and
//! streamed out through `podman export | tar -x`. Nothing here parses image
//! formats; podman and tar are treated as black boxes.

mod export;

pub use export::{export_rootfs, ARCHIVE_TOOL, ENGINE};
