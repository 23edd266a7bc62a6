//! Scheduler: bounded fan-out of project workers across the catalog.

use std::sync::Arc;

use chrono::Utc;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

use super::Harvester;
use crate::catalog::Catalog;
use crate::types::{Event, ProjectReport, RunReport};

impl Harvester {
    /// Process every project of the catalog exactly once
    ///
    /// At most `max_concurrent_projects` project workers are in flight at any
    /// instant: a slot is acquired before a worker is spawned and released
    /// when it finishes. Reports are folded in completion order, so the
    /// failure list does not follow catalog order.
    ///
    /// Per-file failures never abort the run. After [`Harvester::shutdown`]
    /// no new projects are dispatched; in-flight ones finish and the report
    /// is marked `cancelled`.
    pub async fn run(&self, catalog: Arc<Catalog>) -> RunReport {
        let total_files = catalog.total_files();
        let mut report = RunReport::new(catalog.len(), total_files);

        info!(
            projects = catalog.len(),
            total_files,
            max_concurrent_projects = self.config.harvest.max_concurrent_projects,
            extraction_workers = self.extraction.workers(),
            "starting harvest"
        );
        self.emit(Event::RunStarted {
            projects: catalog.len(),
            total_files,
        });

        let mut workers: JoinSet<ProjectReport> = JoinSet::new();

        for index in 0..catalog.len() {
            // Fold whatever already finished so reports stream out while dispatching
            while let Some(joined) = workers.try_join_next() {
                self.record_project(&mut report, joined);
            }

            // Acquire a slot (blocks while max_concurrent_projects workers are running)
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    report.cancelled = true;
                    break;
                }
                permit = self.project_slots.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => {
                        report.cancelled = true;
                        break;
                    }
                },
            };

            let harvester = self.clone();
            let catalog = Arc::clone(&catalog);
            workers.spawn(async move {
                let _permit = permit;
                harvester.fetch_project(&catalog.projects[index]).await
            });
        }

        while let Some(joined) = workers.join_next().await {
            self.record_project(&mut report, joined);
        }

        report.finished_at = Utc::now();

        info!(
            projects_done = report.projects_done,
            files_done = report.files_done,
            downloaded = report.downloaded,
            already_fetched = report.already_fetched,
            failed = report.failure_count(),
            cancelled = report.cancelled,
            elapsed_secs = (report.finished_at - report.started_at).num_seconds(),
            "harvest finished"
        );
        self.emit(Event::RunFinished {
            failed: report.failure_count(),
            files_done: report.files_done,
            cancelled: report.cancelled,
        });

        report
    }

    fn record_project(
        &self,
        report: &mut RunReport,
        joined: std::result::Result<ProjectReport, JoinError>,
    ) {
        match joined {
            Ok(project) => {
                report.record(&project);
                self.emit(Event::ProjectFinished {
                    project: project.project,
                    files: project.files,
                    failed: project.failed,
                    files_done: report.files_done,
                    total_files: report.total_files,
                });
            }
            Err(e) => {
                // Workers convert every error to an outcome; reaching this means a panic
                error!(error = %e, "project worker panicked");
            }
        }
    }
}
