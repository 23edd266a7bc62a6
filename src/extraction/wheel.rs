use crate::error::ExtractError;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::shared::write_member;

/// Whether a zip entry name lives under a top-level `*.dist-info` directory
pub fn is_dist_info_member(name: &str) -> bool {
    name.split('/')
        .next()
        .is_some_and(|top| top.ends_with(".dist-info"))
}

/// Extract the `.dist-info` subtree of a wheel
///
/// Members are selected by name from the central directory; payload entries
/// are never opened, so an unreadable compression method or encryption
/// outside `.dist-info` does not affect the result.
pub(crate) fn extract(dest: &Path, content: &[u8]) -> Result<Vec<PathBuf>, ExtractError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(content))
        .map_err(|e| ExtractError::Zip(format!("failed to read wheel archive: {}", e)))?;

    let mut members: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/') && is_dist_info_member(name))
        .map(str::to_string)
        .collect();
    members.sort();

    let mut extracted = Vec::new();

    for name in &members {
        let mut entry = archive
            .by_name(name)
            .map_err(|e| ExtractError::Zip(format!("failed to read wheel entry {}: {}", name, e)))?;

        if entry.is_dir() {
            continue;
        }

        let relative = match entry.enclosed_name() {
            Some(path) => path.to_path_buf(),
            None => {
                warn!(entry = %name, "skipping wheel entry with unsafe path");
                continue;
            }
        };

        let target = dest.join(relative);
        write_member(&target, &mut entry)?;
        extracted.push(target);
    }

    debug!(
        ?dest,
        extracted_count = extracted.len(),
        "wheel metadata extracted"
    );

    Ok(extracted)
}
