//! Core types for metadata-harvest

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, FailureKind, Result};

/// One distributable file of a project, as listed by the package index
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    /// Original filename; its suffix decides the archive kind
    pub filename: String,
    /// Download location
    pub url: String,
    /// Hex sha256 digest, empty when the index did not provide one
    #[serde(default)]
    pub sha256: String,
    /// Hex blake2b digest, empty when the index did not provide one (carried, never verified)
    #[serde(default)]
    pub blake2b: String,
}

impl ProjectFile {
    /// Create a file record without hashes
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
            sha256: String::new(),
            blake2b: String::new(),
        }
    }

    /// Archive kind derived from the filename suffix
    pub fn archive_kind(&self) -> ArchiveKind {
        ArchiveKind::from_filename(&self.filename)
    }
}

/// A published project and its files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Canonical project name assigned by the index
    pub name: String,
    /// Files in index order
    #[serde(default)]
    pub files: Vec<ProjectFile>,
}

impl Project {
    /// Create a project record
    pub fn new(name: impl Into<String>, files: Vec<ProjectFile>) -> Self {
        Self {
            name: name.into(),
            files,
        }
    }
}

/// Archive format of a distributable file
///
/// Only `.whl` and `.tar.gz` are recognized. Other valid suffixes for either
/// format (`.zip` and `.tar.bz2` sdists, eggs) are deliberately not matched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveKind {
    /// Zip-based built distribution
    Wheel,
    /// Gzip-compressed tar source distribution
    Sdist,
    /// Anything else; skipped without I/O
    Unrecognized,
}

impl ArchiveKind {
    /// Classify a filename by suffix
    pub fn from_filename(filename: &str) -> Self {
        if filename.ends_with(".whl") {
            ArchiveKind::Wheel
        } else if filename.ends_with(".tar.gz") {
            ArchiveKind::Sdist
        } else {
            ArchiveKind::Unrecognized
        }
    }

    /// Directory name used in the on-disk layout, `None` for unrecognized files
    pub fn dir_name(&self) -> Option<&'static str> {
        match self {
            ArchiveKind::Wheel => Some("wheel"),
            ArchiveKind::Sdist => Some("sdist"),
            ArchiveKind::Unrecognized => None,
        }
    }
}

impl std::fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.dir_name().unwrap_or("unrecognized"))
    }
}

/// Result of one file fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// Unrecognized file type; nothing was touched
    Skipped,
    /// Extraction is complete on disk
    Completed {
        /// `false` when the completion marker already existed and no request was made
        downloaded: bool,
    },
    /// Download or extraction failed; no marker was written
    Failed(Error),
}

impl FetchOutcome {
    /// Whether this outcome is a failure
    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed(_))
    }
}

/// Per-project summary returned by the project worker
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReport {
    /// Project name
    pub project: String,
    /// Number of files listed for the project (recognized or not)
    pub files: usize,
    /// Files whose extraction is complete (fresh or from an earlier run)
    pub completed: usize,
    /// Files that were downloaded and extracted in this run
    pub downloaded: usize,
    /// Files skipped as unrecognized
    pub skipped: usize,
    /// Filenames that failed, in project order
    pub failed: Vec<String>,
}

impl ProjectReport {
    /// Empty report for a project with `files` files
    pub fn new(project: impl Into<String>, files: usize) -> Self {
        Self {
            project: project.into(),
            files,
            ..Default::default()
        }
    }
}

/// Aggregate result of a whole run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the last project finished
    pub finished_at: DateTime<Utc>,
    /// Number of projects in the catalog
    pub projects_total: usize,
    /// Number of projects processed in this run
    pub projects_done: usize,
    /// Sum of file counts over all projects in the catalog
    pub total_files: u64,
    /// Sum of file counts over processed projects
    pub files_done: u64,
    /// Files downloaded and extracted in this run
    pub downloaded: u64,
    /// Files already complete from an earlier run
    pub already_fetched: u64,
    /// Failed filenames in completion order
    pub failed: Vec<String>,
    /// The run stopped dispatching projects because shutdown was requested
    pub cancelled: bool,
}

impl RunReport {
    /// Empty report for a run over `projects_total` projects
    pub fn new(projects_total: usize, total_files: u64) -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            finished_at: now,
            projects_total,
            projects_done: 0,
            total_files,
            files_done: 0,
            downloaded: 0,
            already_fetched: 0,
            failed: Vec::new(),
            cancelled: false,
        }
    }

    /// Fold a finished project into the totals
    pub fn record(&mut self, project: &ProjectReport) {
        self.projects_done += 1;
        self.files_done += project.files as u64;
        self.downloaded += project.downloaded as u64;
        self.already_fetched += project.completed.saturating_sub(project.downloaded) as u64;
        self.failed.extend(project.failed.iter().cloned());
    }

    /// Number of failed files
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    /// Write failed filenames to `path`, one per line with a trailing newline
    pub async fn write_failed_list(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content: String = self.failed.iter().map(|f| format!("{f}\n")).collect();
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// Event emitted while a run progresses
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Run started
    RunStarted {
        /// Number of projects in the catalog
        projects: usize,
        /// Total number of files across all projects
        total_files: u64,
    },

    /// A single file failed; emitted as soon as it happens
    FileFailed {
        /// Project the file belongs to
        project: String,
        /// Failed filename
        filename: String,
        /// Failure classification
        kind: FailureKind,
        /// Error message
        error: String,
    },

    /// A project worker finished
    ProjectFinished {
        /// Project name
        project: String,
        /// Number of files in the project
        files: usize,
        /// Failed filenames of this project
        failed: Vec<String>,
        /// Files processed so far across the run
        files_done: u64,
        /// Total number of files across all projects
        total_files: u64,
    },

    /// Run finished (or stopped after shutdown)
    RunFinished {
        /// Number of failed files
        failed: usize,
        /// Files processed across the run
        files_done: u64,
        /// Shutdown was requested before every project was dispatched
        cancelled: bool,
    },
}
