//! Fetch-and-extract pipeline split into focused submodules.
//!
//! The `Harvester` struct and its methods are organized by layer:
//! - [`fetch`] - one idempotent download + extraction for a single file
//! - [`project`] - sequential iteration over one project's files
//! - [`scheduler`] - bounded fan-out of project workers over the catalog

mod fetch;
mod project;
mod scheduler;

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use crate::config::Config;
use crate::error::Result;
use crate::extraction::ExtractionPool;
use crate::http::{HttpClient, ReqwestClient};
use crate::types::Event;
use std::sync::Arc;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;

/// Main harvester instance (cloneable - all fields are Arc-wrapped or cheap handles)
#[derive(Clone)]
pub struct Harvester {
    /// Configuration (wrapped in Arc for sharing across tasks)
    pub(crate) config: Arc<Config>,
    /// HTTP client shared read-only by every concurrent fetch
    pub(crate) client: Arc<dyn HttpClient>,
    /// Blocking worker pool for CPU-bound extraction
    pub(crate) extraction: ExtractionPool,
    /// Limits the number of project workers in flight (max_concurrent_projects)
    pub(crate) project_slots: Arc<Semaphore>,
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: broadcast::Sender<Event>,
    /// Tripped to stop dispatching new projects
    pub(crate) shutdown: CancellationToken,
}

impl Harvester {
    /// Create a harvester with the production HTTP client
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let client = ReqwestClient::new(&config)?;
        Self::with_client(config, Arc::new(client))
    }

    /// Create a harvester with a custom [`HttpClient`]
    pub fn with_client(config: Config, client: Arc<dyn HttpClient>) -> Result<Self> {
        config.validate()?;

        let (event_tx, _rx) = broadcast::channel(config.harvest.event_buffer);
        let extraction = ExtractionPool::new(config.harvest.extraction_workers);
        let project_slots = Arc::new(Semaphore::new(config.harvest.max_concurrent_projects));

        Ok(Self {
            config: Arc::new(config),
            client,
            extraction,
            project_slots,
            event_tx,
            shutdown: CancellationToken::new(),
        })
    }

    /// Subscribe to run events
    ///
    /// Slow subscribers lag and miss events; the pipeline never waits for them.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Stop dispatching new projects; in-flight projects run to completion
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Token tripped by [`Harvester::shutdown`]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        self.event_tx.send(event).ok();
    }
}
