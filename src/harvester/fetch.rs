//! File fetcher: one idempotent download and extraction unit.

use crate::error::{Error, Result};
use crate::extraction::ExtractOutcome;
use crate::layout;
use crate::types::{ArchiveKind, FetchOutcome, ProjectFile};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::Harvester;

impl Harvester {
    /// Fetch and extract a single file
    ///
    /// Steps run strictly in order: marker check, download, extraction,
    /// marker write. A file whose marker exists is reported complete without
    /// any request. Every error is returned as [`FetchOutcome::Failed`] and
    /// never propagates to sibling files or projects.
    pub async fn fetch_file(&self, project: &str, file: &ProjectFile) -> FetchOutcome {
        match self.try_fetch_file(project, file).await {
            Ok(outcome) => outcome,
            Err(e) => FetchOutcome::Failed(e),
        }
    }

    async fn try_fetch_file(&self, project: &str, file: &ProjectFile) -> Result<FetchOutcome> {
        let kind = file.archive_kind();
        if kind == ArchiveKind::Unrecognized {
            debug!(project, filename = %file.filename, "skipping unrecognized file type");
            return Ok(FetchOutcome::Skipped);
        }

        let dest = layout::destination_dir(self.config.data_dir(), project, kind, &file.filename)?;
        tokio::fs::create_dir_all(&dest).await?;

        if layout::is_fetched(&dest).await {
            debug!(project, filename = %file.filename, "already fetched");
            return Ok(FetchOutcome::Completed { downloaded: false });
        }

        let content = self.client.get(&file.url).await?;

        if self.config.harvest.verify_sha256 {
            verify_sha256(file, &content)?;
        }

        match self.extraction.extract(dest.clone(), kind, content).await {
            ExtractOutcome::Extracted(files) => {
                // Only now is the file complete; an interruption before this leaves no marker
                layout::write_marker(&dest).await?;
                debug!(
                    project,
                    filename = %file.filename,
                    %kind,
                    extracted_count = files.len(),
                    "file fetched"
                );
                Ok(FetchOutcome::Completed { downloaded: true })
            }
            ExtractOutcome::Failed(e) => Err(Error::Extract(e)),
            ExtractOutcome::NotApplicable => Ok(FetchOutcome::Skipped),
        }
    }
}

/// Compare downloaded bytes with the catalog's sha256, when one is recorded
pub(crate) fn verify_sha256(file: &ProjectFile, content: &[u8]) -> Result<()> {
    if file.sha256.is_empty() {
        return Ok(());
    }

    let actual = format!("{:x}", Sha256::digest(content));
    if actual.eq_ignore_ascii_case(&file.sha256) {
        Ok(())
    } else {
        Err(Error::IntegrityMismatch {
            filename: file.filename.clone(),
            expected: file.sha256.clone(),
            actual,
        })
    }
}
