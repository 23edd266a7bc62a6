use crate::error::ExtractError;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Write one archive member to `target`, creating parent directories as needed
///
/// An existing file at `target` is overwritten, which is what a retry after
/// an interrupted extraction needs.
pub(crate) fn write_member(target: &Path, reader: &mut impl Read) -> Result<(), ExtractError> {
    let io_err = |source| ExtractError::Io {
        path: target.to_path_buf(),
        source,
    };

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }

    let mut outfile = std::fs::File::create(target).map_err(io_err)?;
    std::io::copy(reader, &mut outfile).map_err(io_err)?;
    Ok(())
}

/// Normalize an archive member path so it stays inside the destination
///
/// Returns `None` for absolute paths and paths with `..` components.
pub(crate) fn enclosed_path(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if normalized.as_os_str().is_empty() {
        None
    } else {
        Some(normalized)
    }
}
