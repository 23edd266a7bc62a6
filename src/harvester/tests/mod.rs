use super::test_helpers::{MockClient, create_test_harvester, test_config};
use crate::catalog::Catalog;
use crate::error::{Error, FailureKind};
use crate::harvester::Harvester;
use crate::layout::{self, MARKER_FILE};
use crate::test_helpers::{sample_sdist, sample_wheel};
use crate::types::{ArchiveKind, Event, FetchOutcome, Project, ProjectFile};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn url_for(filename: &str) -> String {
    format!("https://files.example/packages/{filename}")
}

fn file(filename: &str) -> ProjectFile {
    ProjectFile::new(filename, url_for(filename))
}

fn project(name: &str, filenames: &[&str]) -> Project {
    Project::new(name, filenames.iter().map(|f| file(f)).collect())
}

fn dest_for(data_dir: &Path, project: &str, filename: &str) -> PathBuf {
    let kind = ArchiveKind::from_filename(filename);
    layout::destination_dir(data_dir, project, kind, filename).unwrap()
}

/// Every file under `root` with its contents, sorted by path
fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<(PathBuf, Vec<u8>)> = WalkDir::new(root)
        .into_iter()
        .map(|e| e.unwrap())
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            (
                e.path().strip_prefix(root).unwrap().to_path_buf(),
                std::fs::read(e.path()).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}

/// Mock client serving a wheel and an sdist for every project in `names`
fn serve_projects(client: &MockClient, names: &[&str]) -> Catalog {
    let mut projects = Vec::new();
    for name in names {
        let wheel = format!("{name}-1.0-py3-none-any.whl");
        let sdist = format!("{name}-1.0.tar.gz");
        client.respond(&url_for(&wheel), sample_wheel(name, "1.0"));
        client.respond(&url_for(&sdist), sample_sdist(name, "1.0"));
        projects.push(project(name, &[&wheel, &sdist]));
    }
    Catalog::new(projects)
}

fn drain_events(rx: &mut tokio::sync::broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

// ---------------------------------------------------------------------------
// File fetcher
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unrecognized_file_is_skipped_without_io() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let harvester = create_test_harvester(data.path(), client.clone());

    for filename in ["foo-1.0.zip", "foo-1.0.tar.bz2", "foo-1.0-py2.7.egg"] {
        let outcome = harvester.fetch_file("foo", &file(filename)).await;
        assert!(matches!(outcome, FetchOutcome::Skipped), "{filename}");
    }

    assert_eq!(client.calls(), 0);
    assert!(!data.path().join("metadata").exists(), "no directory may be created");
}

#[tokio::test]
async fn test_fetch_wheel_extracts_and_writes_marker() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let filename = "foo-1.0-py3-none-any.whl";
    client.respond(&url_for(filename), sample_wheel("foo", "1.0"));
    let harvester = create_test_harvester(data.path(), client.clone());

    let outcome = harvester.fetch_file("foo", &file(filename)).await;

    assert!(matches!(
        outcome,
        FetchOutcome::Completed { downloaded: true }
    ));
    let dest = dest_for(data.path(), "foo", filename);
    assert!(dest.join(MARKER_FILE).is_file());
    assert!(dest.join("foo-1.0.dist-info/METADATA").is_file());
    assert!(!dest.join("foo").exists());
    assert_eq!(client.requested(), vec![url_for(filename)]);
}

#[tokio::test]
async fn test_fetch_sdist_extracts_pkg_info() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let filename = "foo-1.0.tar.gz";
    client.respond(&url_for(filename), sample_sdist("foo", "1.0"));
    let harvester = create_test_harvester(data.path(), client.clone());

    let outcome = harvester.fetch_file("foo", &file(filename)).await;

    assert!(matches!(outcome, FetchOutcome::Completed { .. }));
    let dest = data.path().join("metadata/fo/foo/sdist/foo-1.0.tar.gz");
    assert!(dest.join("foo-1.0/PKG-INFO").is_file());
    assert!(dest.join("foo-1.0/pyproject.toml").is_file());
    assert!(!dest.join("foo-1.0/setup.py").exists());
    assert!(dest.join(MARKER_FILE).is_file());
}

#[tokio::test]
async fn test_existing_marker_makes_no_request() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let filename = "foo-1.0.tar.gz";
    let dest = dest_for(data.path(), "foo", filename);
    std::fs::create_dir_all(&dest).unwrap();
    std::fs::write(dest.join(MARKER_FILE), b"").unwrap();
    let harvester = create_test_harvester(data.path(), client.clone());

    let outcome = harvester.fetch_file("foo", &file(filename)).await;

    assert!(matches!(
        outcome,
        FetchOutcome::Completed { downloaded: false }
    ));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_corrupt_archive_fails_without_marker() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let filename = "foo-1.0-py3-none-any.whl";
    client.respond(&url_for(filename), &b"corrupted bytes"[..]);
    let harvester = create_test_harvester(data.path(), client.clone());

    let outcome = harvester.fetch_file("foo", &file(filename)).await;

    match outcome {
        FetchOutcome::Failed(e) => assert_eq!(e.kind(), FailureKind::Extract),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(!dest_for(data.path(), "foo", filename).join(MARKER_FILE).exists());
}

#[tokio::test]
async fn test_http_failure_fails_without_marker() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let filename = "foo-1.0.tar.gz";
    client.respond_status(&url_for(filename), 500);
    let harvester = create_test_harvester(data.path(), client.clone());

    let outcome = harvester.fetch_file("foo", &file(filename)).await;

    assert!(matches!(
        outcome,
        FetchOutcome::Failed(Error::HttpStatus { status: 500, .. })
    ));
    let dest = dest_for(data.path(), "foo", filename);
    assert!(dest.is_dir(), "destination is created before the request");
    assert!(!dest.join(MARKER_FILE).exists());
}

#[tokio::test]
async fn test_failed_file_is_retried_on_next_run() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let filename = "foo-1.0.tar.gz";
    client.respond(&url_for(filename), &b"\x1f\x8b truncated"[..]);
    let harvester = create_test_harvester(data.path(), client.clone());

    assert!(harvester.fetch_file("foo", &file(filename)).await.is_failed());

    client.respond(&url_for(filename), sample_sdist("foo", "1.0"));
    let outcome = harvester.fetch_file("foo", &file(filename)).await;

    assert!(matches!(
        outcome,
        FetchOutcome::Completed { downloaded: true }
    ));
    assert_eq!(client.calls(), 2);
    assert!(dest_for(data.path(), "foo", filename).join(MARKER_FILE).is_file());
}

#[tokio::test]
async fn test_interrupted_extraction_is_redone() {
    // A killed process leaves partial output but no marker
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let filename = "foo-1.0-py3-none-any.whl";
    let dest = dest_for(data.path(), "foo", filename);
    std::fs::create_dir_all(dest.join("foo-1.0.dist-info")).unwrap();
    std::fs::write(dest.join("foo-1.0.dist-info/METADATA"), b"Metadata-Ver").unwrap();
    client.respond(&url_for(filename), sample_wheel("foo", "1.0"));
    let harvester = create_test_harvester(data.path(), client.clone());

    let outcome = harvester.fetch_file("foo", &file(filename)).await;

    assert!(matches!(
        outcome,
        FetchOutcome::Completed { downloaded: true }
    ));
    assert_eq!(client.calls(), 1);
    let metadata = std::fs::read_to_string(dest.join("foo-1.0.dist-info/METADATA")).unwrap();
    assert!(metadata.starts_with("Metadata-Version: 2.1"));
    assert!(dest.join(MARKER_FILE).is_file());
}

#[tokio::test]
async fn test_unsafe_filename_fails_without_request() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let harvester = create_test_harvester(data.path(), client.clone());

    let outcome = harvester
        .fetch_file("foo", &file("../../escape-1.0.tar.gz"))
        .await;

    assert!(matches!(
        outcome,
        FetchOutcome::Failed(Error::InvalidPath { .. })
    ));
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_sha256_verification() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let sdist = sample_sdist("foo", "1.0");
    client.respond(&url_for("foo-1.0.tar.gz"), sdist.clone());
    client.respond(&url_for("foo-2.0.tar.gz"), sdist.clone());
    client.respond(&url_for("foo-3.0.tar.gz"), sdist.clone());

    let mut config = test_config(data.path());
    config.harvest.verify_sha256 = true;
    let harvester = Harvester::with_client(config, client.clone()).unwrap();

    let mut good = file("foo-1.0.tar.gz");
    good.sha256 = format!("{:X}", Sha256::digest(&sdist));
    assert!(matches!(
        harvester.fetch_file("foo", &good).await,
        FetchOutcome::Completed { downloaded: true }
    ));

    let mut bad = file("foo-2.0.tar.gz");
    bad.sha256 = "0".repeat(64);
    match harvester.fetch_file("foo", &bad).await {
        FetchOutcome::Failed(e) => assert_eq!(e.kind(), FailureKind::Integrity),
        other => panic!("expected integrity failure, got {other:?}"),
    }
    assert!(!dest_for(data.path(), "foo", "foo-2.0.tar.gz")
        .join(MARKER_FILE)
        .exists());

    // No recorded hash: nothing to verify against
    let unhashed = file("foo-3.0.tar.gz");
    assert!(matches!(
        harvester.fetch_file("foo", &unhashed).await,
        FetchOutcome::Completed { .. }
    ));
}

// ---------------------------------------------------------------------------
// Project worker
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_project_failure_is_isolated() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    client.respond(&url_for("foo-1.0.tar.gz"), sample_sdist("foo", "1.0"));
    client.respond(&url_for("foo-1.1.tar.gz"), &b"not an archive"[..]);
    client.respond(&url_for("foo-1.2-py3-none-any.whl"), sample_wheel("foo", "1.2"));
    let harvester = create_test_harvester(data.path(), client.clone());

    let report = harvester
        .fetch_project(&project(
            "foo",
            &[
                "foo-1.0.tar.gz",
                "foo-1.1.tar.gz",
                "foo-1.2-py3-none-any.whl",
                "foo-1.3.zip",
            ],
        ))
        .await;

    assert_eq!(report.project, "foo");
    assert_eq!(report.files, 4);
    assert_eq!(report.completed, 2);
    assert_eq!(report.downloaded, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.failed, vec!["foo-1.1.tar.gz".to_string()]);
    assert!(dest_for(data.path(), "foo", "foo-1.0.tar.gz").join(MARKER_FILE).is_file());
    assert!(
        dest_for(data.path(), "foo", "foo-1.2-py3-none-any.whl")
            .join(MARKER_FILE)
            .is_file()
    );
}

#[tokio::test]
async fn test_project_failures_emit_events() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    client.respond_status(&url_for("foo-1.0.tar.gz"), 404);
    let harvester = create_test_harvester(data.path(), client.clone());
    let mut rx = harvester.subscribe();

    harvester
        .fetch_project(&project("foo", &["foo-1.0.tar.gz"]))
        .await;

    let events = drain_events(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::FileFailed {
            project,
            filename,
            kind,
            ..
        } => {
            assert_eq!(project, "foo");
            assert_eq!(filename, "foo-1.0.tar.gz");
            assert_eq!(*kind, FailureKind::Fetch);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

/// Log sink shared with a scoped subscriber
#[derive(Clone, Default)]
struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn test_project_failure_leaves_operator_line_to_event() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(logs.clone())
        .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    client.respond_status(&url_for("foo-1.0.tar.gz"), 404);
    let harvester = create_test_harvester(data.path(), client.clone());
    let mut rx = harvester.subscribe();

    let report = harvester
        .fetch_project(&project("foo", &["foo-1.0.tar.gz"]))
        .await;
    tracing::warn!("end of worker output");

    assert_eq!(report.failed, vec!["foo-1.0.tar.gz"]);
    let failures = drain_events(&mut rx)
        .into_iter()
        .filter(|e| matches!(e, Event::FileFailed { .. }))
        .count();
    assert_eq!(failures, 1);

    let text = logs.text();
    assert!(text.contains("end of worker output"), "{text}");
    assert!(!text.contains("foo-1.0.tar.gz"), "worker logged at warn: {text}");
}

#[tokio::test]
async fn test_project_without_recognized_files_makes_no_requests() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let harvester = create_test_harvester(data.path(), client.clone());

    let report = harvester
        .fetch_project(&project("foo", &["foo-1.0.zip", "foo-1.0.exe"]))
        .await;

    assert!(report.failed.is_empty());
    assert_eq!(report.skipped, 2);
    assert_eq!(client.calls(), 0);

    let report = harvester.fetch_project(&project("empty", &[])).await;
    assert_eq!(report.files, 0);
    assert!(report.failed.is_empty());
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_run_is_idempotent() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let catalog = Arc::new(serve_projects(&client, &["alpha", "beta", "gamma"]));
    let harvester = create_test_harvester(data.path(), client.clone());

    let first = harvester.run(catalog.clone()).await;
    assert_eq!(first.downloaded, 6);
    assert!(first.failed.is_empty());
    assert_eq!(client.calls(), 6);
    let after_first = snapshot(data.path());

    let second = harvester.run(catalog).await;
    assert_eq!(client.calls(), 6, "second run must not issue requests");
    assert_eq!(second.downloaded, 0);
    assert_eq!(second.already_fetched, 6);
    assert_eq!(snapshot(data.path()), after_first);
}

#[tokio::test]
async fn test_run_aggregates_failures_across_projects() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let mut catalog = serve_projects(&client, &["alpha", "beta", "gamma"]);
    client.respond(&url_for("beta-1.0.tar.gz"), &b"garbage"[..]);
    client.respond_status(&url_for("gamma-1.0-py3-none-any.whl"), 410);
    catalog.projects.push(project("delta", &["delta-1.0.msi"]));
    let harvester = create_test_harvester(data.path(), client.clone());

    let report = harvester.run(Arc::new(catalog)).await;

    let mut failed = report.failed.clone();
    failed.sort();
    assert_eq!(
        failed,
        vec![
            "beta-1.0.tar.gz".to_string(),
            "gamma-1.0-py3-none-any.whl".to_string()
        ]
    );
    assert_eq!(report.projects_done, 4);
    assert_eq!(report.downloaded, 4);
    assert!(!report.cancelled);
    assert!(
        dest_for(data.path(), "beta", "beta-1.0-py3-none-any.whl")
            .join(MARKER_FILE)
            .is_file()
    );
    assert!(
        dest_for(data.path(), "gamma", "gamma-1.0.tar.gz")
            .join(MARKER_FILE)
            .is_file()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_run_respects_concurrency_limit() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::with_delay(Duration::from_millis(20)));
    let names: Vec<String> = (0..24).map(|i| format!("proj{i:02}")).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let catalog = Arc::new(serve_projects(&client, &name_refs));

    let mut config = test_config(data.path());
    config.harvest.max_concurrent_projects = 3;
    let harvester = Harvester::with_client(config, client.clone()).unwrap();

    let report = harvester.run(catalog).await;

    assert!(report.failed.is_empty());
    assert_eq!(client.calls(), 48);
    assert!(
        client.max_in_flight() <= 3,
        "at most 3 projects may fetch at once, saw {}",
        client.max_in_flight()
    );
    assert!(
        client.max_in_flight() > 1,
        "projects should overlap, saw {}",
        client.max_in_flight()
    );
    assert_eq!(harvester.project_slots.available_permits(), 3);
}

#[tokio::test]
async fn test_run_reports_progress_in_file_units() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let mut catalog = serve_projects(&client, &["alpha", "beta"]);
    catalog.projects.push(project(
        "gamma",
        &["gamma-1.0.zip", "gamma-1.1.zip", "gamma-1.2.zip", "gamma-1.3.zip"],
    ));
    let harvester = create_test_harvester(data.path(), client.clone());
    let mut rx = harvester.subscribe();

    let report = harvester.run(Arc::new(catalog)).await;

    assert_eq!(report.total_files, 8);
    assert_eq!(report.files_done, 8);

    let events = drain_events(&mut rx);
    assert!(matches!(
        events.first(),
        Some(Event::RunStarted {
            projects: 3,
            total_files: 8
        })
    ));
    assert!(matches!(
        events.last(),
        Some(Event::RunFinished {
            failed: 0,
            files_done: 8,
            cancelled: false
        })
    ));

    let progress: Vec<u64> = events
        .iter()
        .filter_map(|e| match e {
            Event::ProjectFinished { files_done, .. } => Some(*files_done),
            _ => None,
        })
        .collect();
    assert_eq!(progress.len(), 3);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(progress.last(), Some(&8));
}

#[tokio::test]
async fn test_shutdown_stops_dispatch() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let catalog = Arc::new(serve_projects(&client, &["alpha", "beta"]));
    let harvester = create_test_harvester(data.path(), client.clone());

    harvester.shutdown();
    let report = harvester.run(catalog).await;

    assert!(report.cancelled);
    assert_eq!(report.projects_done, 0);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_run_empty_catalog() {
    let data = TempDir::new().unwrap();
    let client = Arc::new(MockClient::new());
    let harvester = create_test_harvester(data.path(), client.clone());

    let report = harvester.run(Arc::new(Catalog::default())).await;

    assert_eq!(report.projects_total, 0);
    assert_eq!(report.files_done, 0);
    assert!(report.failed.is_empty());
    assert!(!report.cancelled);
}
