//! On-disk layout of extracted metadata.
//!
//! ```text
//! <data_dir>/metadata/<name[0:2]>/<name>/<wheel|sdist>/<filename>/
//!     <extracted member paths, as stored in the archive>
//!     .fetched
//! ```
//!
//! The zero-byte `.fetched` marker is the only record of completion. It is
//! written after extraction succeeds and never before, so an interrupted
//! extraction leaves no marker and is retried on the next run.

use crate::error::{Error, Result};
use crate::types::ArchiveKind;
use std::path::{Path, PathBuf};

/// Name of the completion marker inside a destination directory
pub const MARKER_FILE: &str = ".fetched";

/// Subdirectory of the data directory holding extracted metadata
pub const METADATA_DIR: &str = "metadata";

/// First two characters of a project name, used as a fan-out directory
pub fn project_prefix(name: &str) -> String {
    name.chars().take(2).collect()
}

/// Destination directory for one file's extraction output
///
/// Fails for unrecognized archive kinds and for names that would not stay a
/// single path component.
pub fn destination_dir(
    data_dir: &Path,
    project: &str,
    kind: ArchiveKind,
    filename: &str,
) -> Result<PathBuf> {
    let kind_dir = kind.dir_name().ok_or_else(|| Error::InvalidPath {
        path: PathBuf::from(filename),
        reason: "unrecognized archive kind has no destination".to_string(),
    })?;
    check_component(project)?;
    check_component(filename)?;

    Ok(data_dir
        .join(METADATA_DIR)
        .join(project_prefix(project))
        .join(project)
        .join(kind_dir)
        .join(filename))
}

/// Path of the completion marker inside `dest`
pub fn marker_path(dest: &Path) -> PathBuf {
    dest.join(MARKER_FILE)
}

/// Whether `dest` holds a completion marker
pub async fn is_fetched(dest: &Path) -> bool {
    tokio::fs::metadata(marker_path(dest))
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Write the zero-byte completion marker
pub async fn write_marker(dest: &Path) -> Result<()> {
    tokio::fs::write(marker_path(dest), b"").await?;
    Ok(())
}

fn check_component(value: &str) -> Result<()> {
    let reason = if value.is_empty() {
        Some("empty name")
    } else if value == "." || value == ".." {
        Some("relative directory name")
    } else if value.contains(['/', '\\', '\0']) {
        Some("name contains a path separator")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(Error::InvalidPath {
            path: PathBuf::from(value),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
