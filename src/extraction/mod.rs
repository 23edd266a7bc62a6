//! Selective archive extraction
//!
//! This module extracts only the metadata fragments of a distribution:
//! - wheels (zip): every file under a top-level `*.dist-info/` directory
//! - sdists (tar.gz): every regular file named `PKG-INFO` or `pyproject.toml`
//!
//! Everything else in the archive is skipped without being written. Extraction
//! works on an in-memory buffer and never touches the network; the
//! [`ExtractionPool`] runs it on blocking workers so decompression never
//! stalls the async fetch loop.

mod pool;
mod sdist;
mod shared;
mod wheel;


pub use pool::ExtractionPool;
pub use sdist::{SDIST_METADATA_FILES, is_sdist_metadata_member};
pub use wheel::is_dist_info_member;

use crate::error::ExtractError;
use crate::types::ArchiveKind;
use std::path::{Path, PathBuf};

/// Result of one extraction attempt
#[derive(Debug)]
pub enum ExtractOutcome {
    /// Extraction succeeded; the written files are listed (possibly none)
    Extracted(Vec<PathBuf>),
    /// The archive was corrupt or a member could not be written
    Failed(ExtractError),
    /// The archive kind is not extractable; nothing was attempted
    NotApplicable,
}

impl ExtractOutcome {
    /// Whether extraction succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractOutcome::Extracted(_))
    }
}

impl From<Result<Vec<PathBuf>, ExtractError>> for ExtractOutcome {
    fn from(result: Result<Vec<PathBuf>, ExtractError>) -> Self {
        match result {
            Ok(files) => ExtractOutcome::Extracted(files),
            Err(e) => ExtractOutcome::Failed(e),
        }
    }
}

/// Extract the metadata members of `content` into `dest`
///
/// Partially written files may remain after a failure; the caller decides
/// completion by writing the marker only on [`ExtractOutcome::Extracted`].
///
/// # Example
/// ```no_run
/// use metadata_harvest::extraction::{extract, ExtractOutcome};
/// use metadata_harvest::types::ArchiveKind;
/// use std::path::Path;
///
/// let bytes = std::fs::read("requests-2.31.0-py3-none-any.whl").unwrap_or_default();
/// match extract(Path::new("/tmp/out"), ArchiveKind::Wheel, &bytes) {
///     ExtractOutcome::Extracted(files) => println!("wrote {} files", files.len()),
///     ExtractOutcome::Failed(e) => eprintln!("corrupt wheel: {e}"),
///     ExtractOutcome::NotApplicable => {}
/// }
/// ```
pub fn extract(dest: &Path, kind: ArchiveKind, content: &[u8]) -> ExtractOutcome {
    match kind {
        ArchiveKind::Wheel => wheel::extract(dest, content).into(),
        ArchiveKind::Sdist => sdist::extract(dest, content).into(),
        ArchiveKind::Unrecognized => ExtractOutcome::NotApplicable,
    }
}
