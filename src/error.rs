//! Error types for metadata-harvest
//!
//! This module provides the error taxonomy for the harvester:
//! - Fatal errors (catalog load, configuration) that abort a run before it starts
//! - Per-file errors (network, HTTP status, extraction, integrity) that are
//!   recorded against a single file and never escape the file fetcher
//! - A coarse [`FailureKind`] classification for operator-facing reporting

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for metadata-harvest operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for metadata-harvest
///
/// Each variant includes contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "max_concurrent_projects")
        key: Option<String>,
    },

    /// The project catalog could not be read, parsed, or written
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Network error (connection refused, timeout, TLS, body read)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server answered with a non-2xx status
    #[error("HTTP {status} fetching {url}")]
    HttpStatus {
        /// The HTTP status code returned by the server
        status: u16,
        /// The URL that was requested
        url: String,
    },

    /// A file URL from the catalog could not be parsed
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The URL as it appeared in the catalog
        url: String,
        /// The reason parsing failed
        reason: String,
    },

    /// Archive extraction failed
    #[error("extraction error: {0}")]
    Extract(#[from] ExtractError),

    /// Downloaded content does not match the catalog's sha256
    #[error("sha256 mismatch for {filename}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        /// The file whose content failed verification
        filename: String,
        /// Hex digest recorded in the catalog
        expected: String,
        /// Hex digest of the downloaded bytes
        actual: String,
    },

    /// A project name or filename would escape the destination tree
    #[error("invalid path {path}: {reason}")]
    InvalidPath {
        /// The offending path or path component
        path: PathBuf,
        /// The reason the path is rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors raised while loading or saving the project catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog file could not be read
    #[error("failed to read catalog {path}: {source}")]
    Read {
        /// Path of the catalog file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The catalog file is not a valid catalog document
    #[error("failed to parse catalog {path}: {reason}")]
    Parse {
        /// Path of the catalog file
        path: PathBuf,
        /// Parser error message
        reason: String,
    },

    /// The catalog file could not be written
    #[error("failed to write catalog {path}: {source}")]
    Write {
        /// Path of the catalog file
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}

/// Archive extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The wheel is not a readable zip archive
    #[error("invalid wheel archive: {0}")]
    Zip(String),

    /// The sdist is not a readable gzip-compressed tar archive
    #[error("invalid sdist archive: {0}")]
    Tar(String),

    /// Writing an extracted member failed (or reading it from the archive stream)
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination path of the member being written
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// The extraction worker was cancelled or panicked
    #[error("extraction worker failed: {0}")]
    Worker(String),
}

/// Coarse failure classification used in reports and events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Download failed: connection error after retries, or non-2xx status
    Fetch,
    /// Archive was corrupt or could not be written to disk
    Extract,
    /// Downloaded bytes did not match the catalog hash
    Integrity,
    /// Local filesystem problem outside of extraction (directories, marker)
    Filesystem,
    /// Invalid input (unsafe names, unparsable URL, configuration)
    Input,
}

impl Error {
    /// Classify this error for reporting
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Network(_) | Error::HttpStatus { .. } => FailureKind::Fetch,
            Error::Extract(_) => FailureKind::Extract,
            Error::IntegrityMismatch { .. } => FailureKind::Integrity,
            Error::Io(_) | Error::Catalog(_) | Error::Serialization(_) => FailureKind::Filesystem,
            Error::Config { .. }
            | Error::InvalidUrl { .. }
            | Error::InvalidPath { .. }
            | Error::Other(_) => FailureKind::Input,
        }
    }

    /// Build a configuration error for the given key
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}
