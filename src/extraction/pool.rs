use crate::error::ExtractError;
use crate::types::ArchiveKind;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::spawn_blocking;
use tracing::debug;

use super::ExtractOutcome;

/// Bounded pool of blocking workers for CPU-bound extraction
///
/// Callers wait for a worker permit before their buffer is handed to
/// `spawn_blocking`, so at most `workers` extractions run at once and the
/// backlog is bounded by the number of fetchers waiting on a permit.
#[derive(Clone, Debug)]
pub struct ExtractionPool {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl ExtractionPool {
    /// Create a pool running at most `workers` extractions at once (minimum 1)
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Configured number of workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Workers not currently extracting
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Extract `content` into `dest` on a blocking worker
    pub async fn extract(&self, dest: PathBuf, kind: ArchiveKind, content: Bytes) -> ExtractOutcome {
        if kind == ArchiveKind::Unrecognized {
            return ExtractOutcome::NotApplicable;
        }

        let permit = match self.permits.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                return ExtractOutcome::Failed(ExtractError::Worker(
                    "extraction pool closed".to_string(),
                ));
            }
        };

        debug!(?dest, %kind, size = content.len(), "extracting on blocking worker");

        let result = spawn_blocking(move || {
            let _permit = permit;
            super::extract(&dest, kind, &content)
        })
        .await;

        match result {
            Ok(outcome) => outcome,
            Err(e) => ExtractOutcome::Failed(ExtractError::Worker(format!(
                "extraction task panicked: {}",
                e
            ))),
        }
    }
}
