use crate::error::ExtractError;
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::shared::{enclosed_path, write_member};

/// Base filenames extracted from source distributions
pub const SDIST_METADATA_FILES: [&str; 2] = ["pyproject.toml", "PKG-INFO"];

/// Whether a tar member path names one of [`SDIST_METADATA_FILES`]
pub fn is_sdist_metadata_member(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| SDIST_METADATA_FILES.contains(&name))
}

/// Extract `PKG-INFO` and `pyproject.toml` files from a gzip-compressed tarball
pub(crate) fn extract(dest: &Path, content: &[u8]) -> Result<Vec<PathBuf>, ExtractError> {
    if content.is_empty() {
        return Err(ExtractError::Tar("empty archive".to_string()));
    }

    let mut archive = tar::Archive::new(GzDecoder::new(content));
    let entries = archive
        .entries()
        .map_err(|e| ExtractError::Tar(format!("failed to read sdist archive: {}", e)))?;

    let mut extracted = Vec::new();

    for entry in entries {
        let mut entry =
            entry.map_err(|e| ExtractError::Tar(format!("failed to read sdist entry: {}", e)))?;

        if !entry.header().entry_type().is_file() {
            continue;
        }

        let member_path = entry
            .path()
            .map_err(|e| ExtractError::Tar(format!("invalid sdist entry path: {}", e)))?
            .into_owned();

        if !is_sdist_metadata_member(&member_path) {
            continue;
        }

        let Some(relative) = enclosed_path(&member_path) else {
            warn!(entry = %member_path.display(), "skipping sdist entry with unsafe path");
            continue;
        };

        let target = dest.join(relative);
        write_member(&target, &mut entry)?;
        extracted.push(target);
    }

    debug!(
        ?dest,
        extracted_count = extracted.len(),
        "sdist metadata extracted"
    );

    Ok(extracted)
}
