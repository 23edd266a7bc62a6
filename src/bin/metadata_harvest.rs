use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

use metadata_harvest::{Catalog, Config, Event, Harvester, run_with_shutdown};

#[derive(Parser)]
#[command(name = "metadata-harvest")]
#[command(about = "Download wheels and sdists from a catalog and keep only their metadata")]
#[command(version)]
struct Cli {
    /// JSON configuration file; command line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Project catalog (JSON)
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Root data directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Maximum number of projects processed at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Number of extraction workers
    #[arg(long)]
    workers: Option<usize>,

    /// Verify sha256 digests from the catalog before extracting
    #[arg(long)]
    verify_sha256: bool,

    /// Write failed filenames to this file, one per line
    #[arg(long)]
    failed_out: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> metadata_harvest::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(data_dir) = self.data_dir {
            // A relocated data dir carries its default catalog along unless one is given
            if self.catalog.is_none() && self.config.is_none() {
                config.harvest.catalog_path = data_dir.join("files.json");
            }
            config.harvest.data_dir = data_dir;
        }
        if let Some(catalog) = self.catalog {
            config.harvest.catalog_path = catalog;
        }
        if let Some(concurrency) = self.concurrency {
            config.harvest.max_concurrent_projects = concurrency;
        }
        if let Some(workers) = self.workers {
            config.harvest.extraction_workers = workers;
        }
        if self.verify_sha256 {
            config.harvest.verify_sha256 = true;
        }
        if let Some(failed_out) = self.failed_out {
            config.harvest.failed_list_path = Some(failed_out);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let bar = progress_bar();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(BarWriter(bar.clone()))
        .init();

    let config = match Cli::parse().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    let catalog = match Catalog::load(config.catalog_path()).await {
        Ok(catalog) => Arc::new(catalog),
        Err(e) => {
            error!(error = %e, "could not load catalog");
            return ExitCode::FAILURE;
        }
    };

    let failed_list_path = config.harvest.failed_list_path.clone();
    let harvester = match Harvester::new(config) {
        Ok(harvester) => harvester,
        Err(e) => {
            error!(error = %e, "could not start harvester");
            return ExitCode::FAILURE;
        }
    };

    let reporter = tokio::spawn(report_events(harvester.subscribe(), bar));
    let report = run_with_shutdown(&harvester, catalog).await;

    // Dropping the last sender closes the channel and ends the reporter
    drop(harvester);
    reporter.await.ok();

    if let Some(path) = failed_list_path {
        match report.write_failed_list(&path).await {
            Ok(()) => info!(path = %path.display(), "wrote failed file list"),
            Err(e) => warn!(path = %path.display(), error = %e, "could not write failed file list"),
        }
    }

    info!(
        projects = report.projects_done,
        files = report.files_done,
        downloaded = report.downloaded,
        already_fetched = report.already_fetched,
        failed = report.failure_count(),
        cancelled = report.cancelled,
        "done"
    );

    // Per-file failures are expected; they are retried on the next run
    ExitCode::SUCCESS
}

/// File counter drawn on stderr; hidden when stderr is not a terminal
fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{msg} {wide_bar:.green/dim} {pos}/{len} [{elapsed_precise}]")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    bar
}

/// Log lines go to stderr with the progress bar cleared around them
#[derive(Clone)]
struct BarWriter(ProgressBar);

impl Write for BarWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.suspend(|| io::stderr().write(buf))
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.0.suspend(|| io::stderr().write_all(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for BarWriter {
    type Writer = BarWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Log failures as they happen and move the bar as projects finish
async fn report_events(mut events: broadcast::Receiver<Event>, bar: ProgressBar) {
    loop {
        match events.recv().await {
            Ok(Event::RunStarted { total_files, .. }) => {
                bar.set_length(total_files);
                bar.set_position(0);
            }
            Ok(Event::FileFailed { filename, .. }) => {
                warn!("Failed fetching {filename}");
            }
            Ok(Event::ProjectFinished {
                project,
                files_done,
                total_files,
                ..
            }) => {
                bar.set_length(total_files);
                bar.set_position(files_done);
                bar.set_message(project);
            }
            Ok(Event::RunFinished {
                failed, cancelled, ..
            }) => {
                let state = if cancelled { "stopped" } else { "done" };
                bar.finish_with_message(format!("{state}, {failed} failed"));
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "event reporter lagged behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}
