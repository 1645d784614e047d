//! Error types for species-dl
//!
//! Errors are grouped by how far they are allowed to travel:
//! - [`SourceError`] never leaves a species session (the source is abandoned)
//! - [`DownloadError`] never leaves a species session (the candidate is discarded)
//! - [`CatalogError`] and the infrastructure variants of [`Error`] abort a whole run

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for species-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for species-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "validation.min_width")
        key: Option<String>,
    },

    /// Species catalog could not be loaded
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    /// Image download error
    #[error("download error: {0}")]
    Download(#[from] DownloadError),

    /// Source query error
    #[error("source error: {0}")]
    Source(#[from] SourceError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Output root directory could not be created
    #[error("cannot create output root {path}: {source}")]
    OutputRoot {
        /// The output root that could not be created
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },

    /// Browser session could not be started or is unusable
    #[error("browser session error: {0}")]
    Browser(String),

    /// Run was cancelled before it could start
    #[error("run cancelled")]
    Cancelled,
}

/// Catalog loading errors
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Catalog file does not exist
    #[error("catalog not found: {0}")]
    NotFound(PathBuf),

    /// Catalog file exists but could not be read
    #[error("catalog {path} unreadable: {reason}")]
    Unreadable {
        /// Path of the catalog file
        path: PathBuf,
        /// Why the file could not be read
        reason: String,
    },

    /// A required column is missing from the header row
    #[error("catalog {path} is missing required column '{column}'")]
    MissingColumn {
        /// Path of the catalog file
        path: PathBuf,
        /// Name of the missing column
        column: String,
    },

    /// The catalog has rows but none of them yields a search term
    #[error("catalog {path}: none of {rows} rows has a usable search term")]
    NoSearchTerms {
        /// Path of the catalog file
        path: PathBuf,
        /// Number of data rows inspected
        rows: usize,
    },
}

/// Errors raised while querying a source
///
/// Any of these ends the source's candidate stream for the current species.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// Connection-level failure
    #[error("transport error for {url}: {reason}")]
    Transport {
        /// Requested URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// Request exceeded the configured timeout
    #[error("timeout fetching {url}")]
    Timeout {
        /// Requested URL
        url: String,
    },

    /// Unexpected HTTP status
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// Requested URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// The source refused service (rate limit or anti-bot page)
    #[error("blocked by {url}: {reason}")]
    Blocked {
        /// Requested URL
        url: String,
        /// What gave the block away
        reason: String,
    },

    /// Response body could not be interpreted
    #[error("unparseable response from {url}: {reason}")]
    Parse {
        /// Requested URL
        url: String,
        /// Parser failure
        reason: String,
    },

    /// The shared browser session has been closed
    #[error("browser session closed")]
    SessionClosed,
}

impl SourceError {
    /// Whether this error means the whole session infrastructure is gone,
    /// rather than just this one source misbehaving
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, SourceError::SessionClosed)
    }
}

/// Image download errors
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Transfer exceeded the configured timeout
    #[error("timeout downloading {url}")]
    Timeout {
        /// Image URL
        url: String,
    },

    /// Could not connect to the image host
    #[error("connection failed for {url}: {reason}")]
    Connect {
        /// Image URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// Non-success HTTP status
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// Image URL
        url: String,
        /// Response status code
        status: u16,
    },

    /// Response body exceeded the configured maximum size
    #[error("{url} exceeds {limit} bytes")]
    TooLarge {
        /// Image URL
        url: String,
        /// Configured byte limit
        limit: u64,
    },

    /// Other transfer failure (body read, redirect loop, ...)
    #[error("transfer failed for {url}: {reason}")]
    Transport {
        /// Image URL
        url: String,
        /// Underlying failure
        reason: String,
    },

    /// Staging file could not be written or moved
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path being written
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Local filesystem failures are fatal for the species, not just the candidate
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, DownloadError::Io { .. })
    }

    pub(crate) fn from_reqwest(url: &str, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
            }
        } else if e.is_connect() {
            DownloadError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            }
        } else if let Some(status) = e.status() {
            DownloadError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            DownloadError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}
