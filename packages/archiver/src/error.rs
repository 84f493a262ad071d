//! Typed errors for the archiver library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling. The taxonomy separates
//! user-input failures (empty query, no matching company) from
//! infrastructure failures (registry, storage, archive) so callers can
//! map them to different user-visible outcomes.

use std::path::PathBuf;

use thiserror::Error;

/// Errors loading or parsing the company registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Registry source unreachable
    #[error("registry fetch failed: {0}")]
    Http(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Registry source returned a non-success status
    #[error("registry source returned HTTP {status}")]
    Status { status: u16 },

    /// CSV could not be parsed
    #[error("malformed registry CSV: {0}")]
    Malformed(#[from] csv::Error),

    /// A required column is absent from the CSV header
    #[error("registry CSV missing required column: {name}")]
    MissingColumn { name: &'static str },

    /// The CSV parsed but contained no usable records
    #[error("registry snapshot is empty")]
    Empty,
}

/// Errors from a document source, per discovery or per document.
#[derive(Debug, Error)]
pub enum SourceError {
    /// HTTP request failed (connect, TLS, body read)
    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The request did not complete within its timeout
    #[error("timeout fetching {url}")]
    Timeout { url: String },

    /// Non-success HTTP status
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    /// Body too small to be a real document (error page)
    #[error("response for {url} too small ({size} bytes)")]
    TooSmall { url: String, size: usize },

    /// URL could not be parsed or resolved
    #[error("invalid URL: {url}")]
    InvalidUrl { url: String },

    /// Writing the downloaded bytes into the staging directory failed
    #[error("failed to stage {url}: {source}")]
    Stage {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl SourceError {
    /// Whether a retry could plausibly succeed.
    ///
    /// Timeouts, transport errors, 5xx and 429 are transient; everything
    /// else (4xx, undersized bodies, staging I/O) fails fast.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Http { .. } => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Errors from the staging storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Staging root missing, not writable, or out of capacity
    #[error("staging root unavailable: {0}")]
    Unavailable(#[source] std::io::Error),

    /// I/O failure on an individual staging directory
    #[error("staging I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while building an archive from a staging directory.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The staging directory does not exist
    #[error("staging directory missing: {path}")]
    MissingDirectory { path: PathBuf },

    /// I/O failure reading staged files or writing the archive
    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip encoding failure
    #[error("archive write error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Job-level errors surfaced by the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Query validation failed before lookup
    #[error("query must not be empty")]
    EmptyQuery,

    /// No company matched the query (expected, user-facing)
    #[error("no company matched query: {query}")]
    CompanyNotFound { query: String },

    /// Registry snapshot unusable at lookup time (empty or failed
    /// refresh)
    #[error("registry unavailable: {0}")]
    Registry(#[from] RegistryError),

    /// Staging allocation failed
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Document discovery failed outright
    #[error("document discovery failed for {identifier}: {source}")]
    Discovery {
        identifier: String,
        #[source]
        source: SourceError,
    },

    /// Every discovered document failed to download
    #[error("no documents could be retrieved for {identifier}")]
    FetchFailed { identifier: String },

    /// Archive build failed
    #[error("archive build failed: {0}")]
    Archive(#[from] ArchiveError),

    /// The request-level timeout elapsed before serving began
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

impl PipelineError {
    /// Whether this outcome is caused by user input rather than
    /// infrastructure. User errors are not logged as errors.
    pub fn is_user_error(&self) -> bool {
        matches!(self, Self::EmptyQuery | Self::CompanyNotFound { .. })
    }
}

/// Result type alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Result type alias for document source operations.
pub type SourceResult<T> = std::result::Result<T, SourceError>;

/// Result type alias for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Result type alias for pipeline operations.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
