//! # metadata-harvest
//!
//! Bulk harvester of package metadata from a package index.
//!
//! Given a catalog of projects and their distribution files, the harvester
//! downloads every wheel and source distribution, extracts only the metadata
//! members (`*.dist-info/` for wheels, `PKG-INFO` and `pyproject.toml` for
//! sdists) and stores them under a deterministic directory tree:
//!
//! ```text
//! <data_dir>/metadata/<name[0:2]>/<name>/<wheel|sdist>/<filename>/
//! ```
//!
//! A `.fetched` marker is written after a file is fully extracted, so a run
//! can be interrupted and restarted at any point without redoing work.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use metadata_harvest::{Catalog, Config, Harvester};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let catalog = Catalog::load(config.catalog_path()).await?;
//!     let harvester = Harvester::new(config)?;
//!
//!     let mut events = harvester.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = harvester.run(Arc::new(catalog)).await;
//!     println!("{} files failed", report.failure_count());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Catalog of projects and their files
pub mod catalog;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Metadata extraction from wheels and sdists
pub mod extraction;
/// Scheduler, project worker and file fetcher
pub mod harvester;
/// HTTP client seam
pub mod http;
/// On-disk layout of the metadata tree
pub mod layout;
/// Retry logic with exponential backoff
pub mod retry;
/// Core types and events
pub mod types;


use std::sync::Arc;

// Re-export commonly used types
pub use catalog::Catalog;
pub use config::{Config, HarvestConfig, NetworkConfig, RetryConfig};
pub use error::{CatalogError, Error, ExtractError, FailureKind, Result};
pub use harvester::Harvester;
pub use http::{HttpClient, ReqwestClient};
pub use types::{
    ArchiveKind, Event, FetchOutcome, Project, ProjectFile, ProjectReport, RunReport,
};

/// Run the harvester over `catalog` with graceful signal handling.
///
/// A termination signal stops the dispatch of new projects; projects already
/// in flight finish their current files and the returned report is marked
/// `cancelled`.
///
/// Ctrl+C is honored everywhere, SIGTERM on unix as well. See [`run_until`]
/// to stop on a future of your own.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use metadata_harvest::{Catalog, Config, Harvester, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let catalog = Arc::new(Catalog::load(config.catalog_path()).await?);
///     let harvester = Harvester::new(config)?;
///
///     let report = run_with_shutdown(&harvester, catalog).await;
///     println!("cancelled: {}", report.cancelled);
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(harvester: &Harvester, catalog: Arc<Catalog>) -> RunReport {
    run_until(harvester, catalog, shutdown_signal()).await
}

/// Run `harvester` over `catalog`, stopping dispatch once `stop` resolves
///
/// Projects already in flight finish normally; the report is marked
/// `cancelled` if any project was left undispatched.
pub async fn run_until<F>(harvester: &Harvester, catalog: Arc<Catalog>, stop: F) -> RunReport
where
    F: Future<Output = ()> + Send + 'static,
{
    let token = harvester.shutdown_token();
    let watcher = tokio::spawn(async move {
        stop.await;
        tracing::info!("stopping dispatch of new projects");
        token.cancel();
    });

    let report = harvester.run(catalog).await;
    watcher.abort();
    report
}

/// Resolves on SIGTERM (unix) or Ctrl+C
///
/// A handler that cannot be installed never fires, so the run then ends
/// only when the catalog is exhausted.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
