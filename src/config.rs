//! Configuration types for metadata-harvest

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};
use tokio::sync::Semaphore;

/// Largest accepted `event_buffer`; the channel allocates every slot up front
pub const MAX_EVENT_BUFFER: usize = 1 << 20;

/// Harvest behavior configuration (directories, concurrency, reporting)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Root data directory; extracted metadata lands under `<data_dir>/metadata` (default: "./data")
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Serialized project catalog read at startup (default: "./data/files.json")
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,

    /// Maximum number of projects processed concurrently (default: 100)
    #[serde(default = "default_max_concurrent_projects")]
    pub max_concurrent_projects: usize,

    /// Number of blocking workers used for archive extraction (default: available CPUs)
    #[serde(default = "default_extraction_workers")]
    pub extraction_workers: usize,

    /// Verify downloaded bytes against the catalog sha256 before extracting (default: false)
    ///
    /// Files with an empty sha256 in the catalog are never verified.
    #[serde(default)]
    pub verify_sha256: bool,

    /// Optional sidecar file listing failed filenames, one per line
    #[serde(default)]
    pub failed_list_path: Option<PathBuf>,

    /// Capacity of the event broadcast channel (default: 1024)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            catalog_path: default_catalog_path(),
            max_concurrent_projects: default_max_concurrent_projects(),
            extraction_workers: default_extraction_workers(),
            verify_sha256: false,
            failed_list_path: None,
            event_buffer: default_event_buffer(),
        }
    }
}

/// HTTP client configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Retry policy for connection-level failures
    #[serde(default)]
    pub retry: RetryConfig,

    /// Timeout for a single request including the body (default: 300 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Main configuration for the harvester
///
/// Sub-configs are flattened, so the JSON format has no nesting apart from `retry`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Directories, concurrency and reporting
    #[serde(flatten)]
    pub harvest: HarvestConfig,

    /// HTTP client behavior
    #[serde(flatten)]
    pub network: NetworkConfig,
}

impl Config {
    /// Load configuration from a JSON file
    ///
    /// Missing fields take their defaults, so `{}` is a valid configuration.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file {}: {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&content).map_err(|e| Error::Config {
            message: format!("failed to parse config file {}: {}", path.display(), e),
            key: None,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the harvester cannot run with
    pub fn validate(&self) -> Result<()> {
        let harvest = &self.harvest;
        check_permits("max_concurrent_projects", harvest.max_concurrent_projects)?;
        check_permits("extraction_workers", harvest.extraction_workers)?;
        if harvest.event_buffer == 0 || harvest.event_buffer > MAX_EVENT_BUFFER {
            return Err(Error::config(
                "event_buffer",
                format!("must be between 1 and {MAX_EVENT_BUFFER}"),
            ));
        }
        let multiplier = self.network.retry.backoff_multiplier;
        if multiplier.is_nan() || multiplier < 1.0 {
            return Err(Error::config(
                "retry.backoff_multiplier",
                "must be at least 1.0",
            ));
        }
        Ok(())
    }

    /// Root data directory
    pub fn data_dir(&self) -> &PathBuf {
        &self.harvest.data_dir
    }

    /// Catalog path
    pub fn catalog_path(&self) -> &PathBuf {
        &self.harvest.catalog_path
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 15)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("./data/files.json")
}

fn default_max_concurrent_projects() -> usize {
    100
}

fn default_extraction_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Semaphore-backed limits need at least one permit and at most `Semaphore::MAX_PERMITS`
fn check_permits(key: &str, value: usize) -> Result<()> {
    if value == 0 || value > Semaphore::MAX_PERMITS {
        return Err(Error::config(
            key,
            format!("must be between 1 and {}", Semaphore::MAX_PERMITS),
        ));
    }
    Ok(())
}

fn default_event_buffer() -> usize {
    1024
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_user_agent() -> String {
    format!("metadata-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    15
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
