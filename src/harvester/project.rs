//! Project worker: runs the file fetcher over one project's files.

use crate::types::{Event, FetchOutcome, Project, ProjectReport};
use tracing::debug;

use super::Harvester;

impl Harvester {
    /// Fetch every file of `project` in order and collect the failures
    ///
    /// Files within a project are fetched one after another; parallelism
    /// comes from running many projects at once. A project with no
    /// recognized files finishes without any network activity.
    pub async fn fetch_project(&self, project: &Project) -> ProjectReport {
        let mut report = ProjectReport::new(&project.name, project.files.len());

        for file in &project.files {
            match self.fetch_file(&project.name, file).await {
                FetchOutcome::Skipped => report.skipped += 1,
                FetchOutcome::Completed { downloaded } => {
                    report.completed += 1;
                    if downloaded {
                        report.downloaded += 1;
                    }
                }
                FetchOutcome::Failed(e) => {
                    // Operators see failures through Event::FileFailed
                    debug!(
                        project = %project.name,
                        filename = %file.filename,
                        kind = ?e.kind(),
                        error = %e,
                        "failed fetching file"
                    );
                    self.emit(Event::FileFailed {
                        project: project.name.clone(),
                        filename: file.filename.clone(),
                        kind: e.kind(),
                        error: e.to_string(),
                    });
                    report.failed.push(file.filename.clone());
                }
            }
        }

        report
    }
}
