//! Project catalog: the read-only input dataset of a run.
//!
//! The catalog is produced by a separate enumeration step and stored as a
//! JSON document:
//!
//! ```json
//! {"projects": [{"name": "requests", "files": [
//!     {"filename": "requests-2.31.0.tar.gz", "url": "https://...", "sha256": "...", "blake2b": ""}
//! ]}]}
//! ```
//!
//! Serialization is deterministic (field order follows the struct definitions,
//! project and file order is preserved), so load/save round-trips losslessly.

use crate::error::{CatalogError, Result};
use crate::types::Project;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Ordered collection of projects
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    /// Projects in enumeration order
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl Catalog {
    /// Create a catalog from projects
    pub fn new(projects: Vec<Project>) -> Self {
        Self { projects }
    }

    /// Read and parse a catalog file
    ///
    /// Any failure here is fatal for a run: there is nothing to iterate.
    pub async fn load(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| CatalogError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let catalog = Self::from_slice(&bytes, path)?;

        info!(
            path = %path.display(),
            projects = catalog.len(),
            files = catalog.total_files(),
            "loaded catalog"
        );
        Ok(catalog)
    }

    /// Parse a catalog from bytes; `path` is only used for error context
    pub fn from_slice(bytes: &[u8], path: &Path) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| {
            CatalogError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Write the catalog to `path`
    ///
    /// The document is written to a sibling temporary file and renamed into
    /// place, so readers never observe a half-written catalog. Output is
    /// indented, one field per line, so catalog changes diff cleanly.
    pub async fn save(&self, path: &Path) -> Result<()> {
        let write_err = |source| CatalogError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let bytes = serde_json::to_vec_pretty(self)?;
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = std::path::PathBuf::from(tmp_name);

        tokio::fs::write(&tmp_path, &bytes)
            .await
            .map_err(write_err)?;
        tokio::fs::rename(&tmp_path, path)
            .await
            .map_err(write_err)?;
        Ok(())
    }

    /// Number of projects
    pub fn len(&self) -> usize {
        self.projects.len()
    }

    /// Whether the catalog has no projects
    pub fn is_empty(&self) -> bool {
        self.projects.is_empty()
    }

    /// Sum of file counts over all projects; the unit of progress
    pub fn total_files(&self) -> u64 {
        self.projects.iter().map(|p| p.files.len() as u64).sum()
    }
}
